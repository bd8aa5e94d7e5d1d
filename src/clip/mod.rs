//! # Clip Descriptors
//!
//! A clip is one unit of scheduled playback: an optional video source, an
//! optional audio source (or the silence token) and a duration in milliseconds.
//!
//! Clip sources are pull-based and finite. Anything that iterates
//! [`ClipDescriptor`]s is a [`ClipSource`]; [`ConfDirSource`] reads them from a
//! directory of clip files.
//!
//! ```rust,no_run
//! use splash_sequencer::clip::{ClipDescriptor, ConfDirSource};
//!
//! let source = ConfDirSource::open("/etc/splash-sequencer.d", "/usr/share/splash-sequencer/media");
//! for clip in source {
//!     println!("{}", clip);
//! }
//!
//! let inline = vec![ClipDescriptor::from_fields("logo.png", "s", 3000)];
//! assert!(inline[0].audio.as_ref().unwrap().is_silence());
//! ```

pub mod source;
pub mod types;

pub use source::{ClipSource, ConfDirSource, FACTORY_CLIP_FILE};
pub use types::{AudioSource, ClipDescriptor, SILENCE_TOKEN};
