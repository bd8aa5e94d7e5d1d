//! # Sequencing Engine
//!
//! Drives clips through the shared output pipeline one at a time.
//!
//! - [`SubgraphBuilder`] turns a clip into a subgraph and decides, once every
//!   decoder branch has reported, which branch feeds which sink.
//! - [`TimerService`] arms the per-clip duration timer and watchdog ceiling and
//!   posts their expiry on the bus.
//! - [`EventDispatcher`] classifies bus messages for the active clip and
//!   hands out the render target.
//! - [`ClipSequencer`] owns all of the above and the pipeline itself.
//!
//! ```rust,no_run
//! use splash_sequencer::{
//!     clip::ClipDescriptor,
//!     config::Config,
//!     engine::ClipSequencer,
//!     pipeline::{Bus, LaunchPipeline},
//!     surface::{DisplaySurface, LazyRenderTarget},
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let bus = Bus::new();
//! let pipeline = LaunchPipeline::new(config.templates.clone(), bus.sender());
//! let surface = DisplaySurface::open(None)?;
//! let target = LazyRenderTarget::new(Box::new(surface));
//!
//! let mut sequencer = ClipSequencer::new(pipeline, bus, &config.timing, target);
//! let outcome = sequencer
//!     .run(vec![ClipDescriptor::from_fields("/usr/share/splash/logo.png", "s", 3000)].into_iter())
//!     .await;
//! assert!(!outcome.is_fatal());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod dispatcher;
pub mod sequencer;
pub mod timer;

pub use builder::SubgraphBuilder;
pub use dispatcher::{EventDispatcher, Signal, Terminal};
pub use sequencer::{ClipSequencer, SequenceOutcome, SequencerState};
pub use timer::{Clock, TimeoutHandle, TimerService, TokioClock};
