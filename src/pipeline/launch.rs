use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::{TemplateConfig, TEMPLATE_PLACEHOLDER};
use crate::error::PipelineError;
use crate::pipeline::bus::{BusMessage, BusSender};
use crate::pipeline::subgraph::{
    BranchId, BranchReport, BranchSource, LinkPlan, Subgraph, SubgraphId,
};
use crate::pipeline::{MediaKind, OutputPipeline, PipelineState};
use crate::surface::RenderTarget;

/// How long the cover frame may take before it is abandoned
const COVER_TIMEOUT: Duration = Duration::from_secs(2);

/// How long stream discovery may take before a branch falls back to its own kind
const DISCOVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Output pipeline that runs each linked branch as a launcher child process.
///
/// Linking decides which branches run at all: a branch that feeds no sink is
/// never launched. Children start when the pipeline is PLAYING and the
/// subgraph is linked, whichever happens last. The subgraph reaches
/// end-of-stream when every child has exited successfully; any failure is
/// reported as an error for the subgraph. A subgraph with nothing linked
/// never ends by itself.
///
/// Decoder branches report their outputs once the discoverer has listed the
/// file's streams, so a movie offers both its picture and its soundtrack.
///
/// Sinks open their own windows; the render target handed over by the
/// sequencer is only logged.
///
/// Every child is started with a parent-death signal, so the kernel kills it
/// if this process dies without tearing down (the watchdog abort). The signal
/// is tied to the spawning thread, which is why the runtime must be
/// single-threaded.
pub struct LaunchPipeline {
    templates: TemplateConfig,
    bus: BusSender,
    state: PipelineState,
    attached: Option<Attached>,
}

struct Attached {
    id: SubgraphId,
    branches: Vec<LaunchBranch>,
    plan: Option<LinkPlan>,
    running: Option<Running>,
    discoveries: Vec<JoinHandle<()>>,
}

#[derive(Debug, Clone)]
struct LaunchBranch {
    id: BranchId,
    kind: MediaKind,
    source: BranchSource,
}

struct Running {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl LaunchPipeline {
    pub fn new(templates: TemplateConfig, bus: BusSender) -> Self {
        Self {
            templates,
            bus,
            state: PipelineState::Null,
            attached: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Content sniffing: does the file start like an image? The extension is ignored.
    pub fn sniff_still_image(path: &Path) -> bool {
        File::open(path)
            .and_then(|file| image::io::Reader::new(BufReader::new(file)).with_guessed_format())
            .map(|reader| reader.format().is_some())
            .unwrap_or(false)
    }

    /// Stream kinds listed in discoverer output, video first
    pub fn parse_discovered_streams(output: &str) -> Vec<MediaKind> {
        let has_stream = |kind: &str| {
            output.lines().map(str::trim_start).any(|line| {
                line.strip_prefix(kind)
                    .is_some_and(|rest| rest.starts_with(':') || rest.starts_with(" #"))
            })
        };

        let mut outputs = Vec::with_capacity(2);
        if has_stream("video") {
            outputs.push(MediaKind::Video);
        }
        if has_stream("audio") {
            outputs.push(MediaKind::Audio);
        }
        outputs
    }

    /// Split a template into launcher arguments, substituting the first `%s`
    pub fn render_template(template: &str, value: &str) -> Vec<String> {
        let value = if value.chars().any(char::is_whitespace) {
            format!("\"{}\"", value)
        } else {
            value.to_string()
        };

        let mut substituted = false;
        template
            .split_whitespace()
            .map(|arg| {
                if !substituted && arg.contains(TEMPLATE_PLACEHOLDER) {
                    substituted = true;
                    arg.replacen(TEMPLATE_PLACEHOLDER, &value, 1)
                } else {
                    arg.to_string()
                }
            })
            .collect()
    }

    /// Launcher arguments for one branch, chosen by the sinks it feeds
    fn branch_args(&self, branch: &LaunchBranch, plan: &LinkPlan) -> Vec<String> {
        let path = match &branch.source {
            BranchSource::Silence => return Self::render_template(&self.templates.silence, ""),
            BranchSource::File(path) => path,
        };

        let links = || plan.links.iter().filter(|l| l.branch == branch.id);
        let feeds_video = links().any(|l| l.sink == MediaKind::Video);
        let feeds_audio = links().any(|l| l.sink == MediaKind::Audio);
        let via_hold = links().any(|l| l.via_hold);

        let template = match (feeds_video, feeds_audio) {
            (true, true) => &self.templates.movie,
            (true, false) if via_hold => &self.templates.still,
            (true, false) => &self.templates.video,
            (false, _) => &self.templates.audio,
        };
        Self::render_template(template, &path.display().to_string())
    }

    fn command(&self, program: &str, args: &[String]) -> Command {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true);
        die_with_parent(&mut command);
        command
    }

    fn post_error(&self, subgraph: SubgraphId, source: &str, message: String) {
        self.bus.post(BusMessage::Error {
            subgraph,
            source: source.to_string(),
            message,
            debug: None,
        });
    }

    /// Start the attached subgraph if it is linked and the pipeline is playing
    fn maybe_launch(&mut self) {
        if self.state != PipelineState::Playing {
            return;
        }
        let Some(attached) = self.attached.as_ref() else {
            return;
        };
        if attached.running.is_some() {
            return;
        }
        let Some(plan) = attached.plan.as_ref() else {
            return;
        };

        let id = attached.id;
        let mut children = Vec::new();
        for branch in &attached.branches {
            if !plan.is_linked(branch.id) {
                debug!("{}: branch {} feeds no sink, not launching", id, branch.kind);
                continue;
            }
            let args = self.branch_args(branch, plan);
            let name = format!("{}-{}", id, branch.kind);
            debug!("{}: launching {} {}", name, self.templates.launcher, args.join(" "));

            match self.command(&self.templates.launcher, &args).spawn() {
                Ok(child) => children.push((name, child)),
                Err(e) => {
                    let failure = PipelineError::LaunchFailed {
                        branch: name.clone(),
                        reason: e.to_string(),
                    };
                    self.post_error(id, &name, failure.to_string());
                    return;
                }
            }
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(supervise(id, children, self.bus.clone(), shutdown_rx));
        if let Some(attached) = self.attached.as_mut() {
            attached.running = Some(Running { shutdown, handle });
        }

        self.bus.post(BusMessage::AsyncDone { subgraph: id });
    }

    fn stop_running(&mut self) -> Option<JoinHandle<()>> {
        let running = self.attached.as_mut()?.running.take()?;
        let _ = running.shutdown.send(());
        Some(running.handle)
    }
}

/// Have the kernel SIGKILL the child when the spawning thread dies
fn die_with_parent(command: &mut Command) {
    #[cfg(target_os = "linux")]
    {
        let parent = std::process::id() as libc::pid_t;
        // SAFETY: only async-signal-safe calls between fork and exec
        unsafe {
            command.pre_exec(move || {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                // The parent may already be gone
                if libc::getppid() != parent {
                    return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
                }
                Ok(())
            });
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = command;
}

/// List the file's streams, falling back to the branch's own kind
async fn discover_outputs(discoverer: String, path: PathBuf, kind: MediaKind) -> Vec<MediaKind> {
    let mut command = Command::new(&discoverer);
    command
        .arg(&path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    die_with_parent(&mut command);

    let outputs = match tokio::time::timeout(DISCOVER_TIMEOUT, command.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            LaunchPipeline::parse_discovered_streams(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(Ok(output)) => {
            debug!("{} {:?} exited with {}", discoverer, path, output.status);
            Vec::new()
        }
        Ok(Err(e)) => {
            debug!("Could not run {}: {}", discoverer, e);
            Vec::new()
        }
        Err(_) => {
            warn!("Stream discovery of {:?} timed out", path);
            Vec::new()
        }
    };

    if outputs.is_empty() {
        vec![kind]
    } else {
        outputs
    }
}

/// Wait for every child of one subgraph, reporting end-of-stream or the first failure
async fn supervise(
    subgraph: SubgraphId,
    children: Vec<(String, Child)>,
    bus: BusSender,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut waits = JoinSet::new();
    for (name, mut child) in children {
        waits.spawn(async move {
            let status = child.wait().await;
            (name, status)
        });
    }

    if waits.is_empty() {
        debug!("{}: nothing linked, idle until detached", subgraph);
    }

    let mut failed = false;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            joined = waits.join_next(), if !waits.is_empty() => {
                let failure = match joined {
                    Some(Ok((name, Ok(status)))) if status.success() => {
                        debug!("{} finished", name);
                        None
                    }
                    Some(Ok((name, Ok(status)))) => Some((name, format!("exited with {}", status))),
                    Some(Ok((name, Err(e)))) => Some((name, e.to_string())),
                    Some(Err(e)) => Some((subgraph.to_string(), e.to_string())),
                    None => None,
                };

                if let Some((name, message)) = failure {
                    failed = true;
                    bus.post(BusMessage::Error {
                        subgraph,
                        source: name,
                        message,
                        debug: None,
                    });
                } else if waits.is_empty() && !failed {
                    bus.post(BusMessage::Eos { subgraph });
                }
            }
        }
    }

    // Dropping the children kills them
    waits.shutdown().await;
}

impl OutputPipeline for LaunchPipeline {
    fn attach(&mut self, subgraph: &Subgraph) -> Result<(), PipelineError> {
        if let Some(attached) = &self.attached {
            return Err(PipelineError::AttachFailed {
                name: subgraph.name(),
                reason: format!("{} is still attached", attached.id),
            });
        }

        let id = subgraph.id();
        let branches: Vec<LaunchBranch> = subgraph
            .branches()
            .iter()
            .map(|b| LaunchBranch {
                id: b.id,
                kind: b.kind,
                source: b.source.clone(),
            })
            .collect();
        info!("Attached {} ({} branches)", id, branches.len());

        if subgraph.has_kind(MediaKind::Video) {
            self.bus.post(BusMessage::PrepareWindowHandle { subgraph: id });
        }

        // Type detection happens here; decoders know their pads once the streams are listed
        let mut discoveries = Vec::new();
        for branch in branches.iter().filter(|b| !matches!(b.source, BranchSource::Silence)) {
            let Some(path) = branch.source.path() else {
                continue;
            };
            if !path.is_file() {
                self.post_error(
                    id,
                    &format!("{}-{}", id, branch.kind),
                    format!("Resource not found: {}", path.display()),
                );
                continue;
            }

            if branch.kind == MediaKind::Video && Self::sniff_still_image(path) {
                self.bus.post(BusMessage::NoMorePads {
                    subgraph: id,
                    branch: branch.id,
                    report: BranchReport::still_image(),
                });
                continue;
            }

            let bus = self.bus.clone();
            let discovery = discover_outputs(
                self.templates.discoverer.clone(),
                path.to_path_buf(),
                branch.kind,
            );
            let branch_id = branch.id;
            discoveries.push(tokio::spawn(async move {
                let outputs = discovery.await;
                bus.post(BusMessage::NoMorePads {
                    subgraph: id,
                    branch: branch_id,
                    report: BranchReport::new(outputs),
                });
            }));
        }

        self.attached = Some(Attached {
            id,
            branches,
            plan: None,
            running: None,
            discoveries,
        });
        Ok(())
    }

    fn link(&mut self, subgraph: SubgraphId, plan: &LinkPlan) -> Result<(), PipelineError> {
        let attached = self
            .attached
            .as_mut()
            .filter(|a| a.id == subgraph)
            .ok_or_else(|| PipelineError::UnknownSubgraph {
                name: subgraph.to_string(),
            })?;

        for link in &plan.links {
            if !attached.branches.iter().any(|b| b.id == link.branch) {
                return Err(PipelineError::LinkFailed {
                    branch: format!("{}-{}", subgraph, link.branch.0),
                    sink: link.sink.to_string(),
                    reason: "no such branch".to_string(),
                });
            }
        }

        attached.plan = Some(plan.clone());
        self.maybe_launch();
        Ok(())
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError> {
        let old = self.state;
        self.state = state;
        if old != state {
            self.bus.post(BusMessage::StateChanged { old, new: state });
        }

        match state {
            PipelineState::Playing => self.maybe_launch(),
            PipelineState::Null => {
                // Children are reaped on drop; nothing to wait for here
                self.stop_running();
            }
            PipelineState::Ready | PipelineState::Paused => {}
        }
        Ok(())
    }

    fn set_render_target(&mut self, target: RenderTarget) {
        debug!("Render target {:#x} offered; sinks open their own windows", target.handle);
    }

    async fn detach(&mut self, subgraph: SubgraphId) -> Result<(), PipelineError> {
        match &self.attached {
            Some(attached) if attached.id == subgraph => {}
            _ => {
                return Err(PipelineError::UnknownSubgraph {
                    name: subgraph.to_string(),
                })
            }
        }

        if let Some(handle) = self.stop_running() {
            if let Err(e) = handle.await {
                warn!("{}: supervisor ended abnormally: {}", subgraph, e);
            }
        }
        if let Some(attached) = self.attached.take() {
            for discovery in attached.discoveries {
                discovery.abort();
            }
        }
        info!("Detached {}", subgraph);
        Ok(())
    }

    async fn paint_cover(
        &mut self,
        _target: RenderTarget,
        color: [u8; 3],
    ) -> Result<(), PipelineError> {
        let argb = 0xff00_0000u32
            | (u32::from(color[0]) << 16)
            | (u32::from(color[1]) << 8)
            | u32::from(color[2]);
        let args = Self::render_template(&self.templates.cover, &format!("{:#010x}", argb));

        let mut child = self
            .command(&self.templates.launcher, &args)
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PipelineError::CoverFailed {
                reason: e.to_string(),
            })?;

        match tokio::time::timeout(COVER_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(PipelineError::CoverFailed {
                reason: format!("exited with {}", status),
            }),
            Ok(Err(e)) => Err(PipelineError::CoverFailed {
                reason: e.to_string(),
            }),
            Err(_) => {
                let _ = child.kill().await;
                Err(PipelineError::CoverFailed {
                    reason: "timed out".to_string(),
                })
            }
        }
    }
}
