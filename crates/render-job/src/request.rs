//! Render request parameters and argument assembly.

use std::path::{Path, PathBuf};

use cutroom_common::config::RenderDefaults;

/// A render request: everything needed to launch the engine renderer.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Engine command-line renderer.
    pub renderer: PathBuf,

    /// Composition description handed to the renderer.
    pub scene_list: PathBuf,

    /// Output media file.
    pub destination: PathBuf,

    /// Process id of the host that launched the render.
    pub caller_pid: Option<u32>,

    /// First frame to render.
    pub in_frame: Option<u64>,

    /// Last frame to render (inclusive).
    pub out_frame: Option<u64>,

    /// Explicit frame count, overriding the one derived from the bounds.
    pub total_frames: Option<u64>,

    /// Subtitles converted before the render starts.
    pub subtitle_file: Option<PathBuf>,

    /// Subtitle conversion executable.
    pub subtitle_tool: PathBuf,

    /// Additional renderer arguments, appended last.
    pub extra_args: Vec<String>,

    /// Log file location; defaults to `<destination>.log`.
    pub log_path: Option<PathBuf>,

    /// Remove the scene list after a successful render.
    pub erase_scene_list: bool,

    /// Remove the partial destination after an abort.
    pub erase_on_abort: bool,

    /// Remove the log file after a successful render.
    pub remove_log_on_success: bool,
}

impl RenderRequest {
    /// Create a request with default tools and no optional parts.
    pub fn new(
        renderer: impl AsRef<Path>,
        scene_list: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> Self {
        Self {
            renderer: renderer.as_ref().to_path_buf(),
            scene_list: scene_list.as_ref().to_path_buf(),
            destination: destination.as_ref().to_path_buf(),
            caller_pid: None,
            in_frame: None,
            out_frame: None,
            total_frames: None,
            subtitle_file: None,
            subtitle_tool: RenderDefaults::default().subtitle_tool,
            extra_args: Vec::new(),
            log_path: None,
            erase_scene_list: false,
            erase_on_abort: false,
            remove_log_on_success: false,
        }
    }

    /// Set the caller's process id.
    pub fn caller_pid(mut self, pid: u32) -> Self {
        self.caller_pid = Some(pid);
        self
    }

    /// Restrict the render to `[in_frame, out_frame]`.
    pub fn frame_range(mut self, in_frame: u64, out_frame: u64) -> Self {
        self.in_frame = Some(in_frame);
        self.out_frame = Some(out_frame);
        self
    }

    /// Set an explicit total frame count.
    pub fn total_frames(mut self, total: u64) -> Self {
        self.total_frames = Some(total);
        self
    }

    /// Convert and burn in a subtitle file.
    pub fn subtitle_file(mut self, path: impl AsRef<Path>) -> Self {
        self.subtitle_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use a different subtitle conversion executable.
    pub fn subtitle_tool(mut self, tool: impl AsRef<Path>) -> Self {
        self.subtitle_tool = tool.as_ref().to_path_buf();
        self
    }

    /// Add one renderer argument.
    pub fn extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Add multiple renderer arguments.
    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Write the log to `path`.
    pub fn log_path(mut self, path: impl AsRef<Path>) -> Self {
        self.log_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn erase_scene_list(mut self, erase: bool) -> Self {
        self.erase_scene_list = erase;
        self
    }

    pub fn erase_on_abort(mut self, erase: bool) -> Self {
        self.erase_on_abort = erase;
        self
    }

    pub fn remove_log_on_success(mut self, remove: bool) -> Self {
        self.remove_log_on_success = remove;
        self
    }

    /// Whether a subtitle pass runs before the render.
    pub fn has_subtitle_pass(&self) -> bool {
        self.subtitle_file
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty())
    }

    /// Frame count used for percentages, if known.
    pub fn known_total_frames(&self) -> Option<u64> {
        self.total_frames.or(match (self.in_frame, self.out_frame) {
            (Some(i), Some(o)) if o >= i => (o - i).checked_add(1),
            (None, Some(o)) => o.checked_add(1),
            _ => None,
        })
    }

    /// Effective log file location.
    pub fn effective_log_path(&self) -> PathBuf {
        self.log_path.clone().unwrap_or_else(|| {
            let mut name = self.destination.as_os_str().to_owned();
            name.push(".log");
            PathBuf::from(name)
        })
    }

    /// Intermediate file the subtitle pass writes.
    pub fn subtitle_intermediate(&self) -> PathBuf {
        self.destination.with_extension("subtitles.ass")
    }

    /// Arguments for the subtitle conversion pass.
    pub fn subtitle_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-i".to_string(),
        ];
        if let Some(file) = &self.subtitle_file {
            args.push(file.to_string_lossy().to_string());
        }
        args.push(self.subtitle_intermediate().to_string_lossy().to_string());
        args
    }

    /// Arguments for the primary render.
    pub fn render_args(&self) -> Vec<String> {
        let mut args = vec![self.scene_list.to_string_lossy().to_string()];

        if let Some(i) = self.in_frame {
            args.push(format!("in={i}"));
        }
        if let Some(o) = self.out_frame {
            args.push(format!("out={o}"));
        }

        if self.has_subtitle_pass() {
            args.push("-attach".to_string());
            args.push("avfilter.subtitles".to_string());
            args.push(format!(
                "av.filename={}",
                self.subtitle_intermediate().to_string_lossy()
            ));
        }

        // Engine progress lines on stderr
        args.push("-progress".to_string());

        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Printable command line for logs.
    pub fn render_command_line(&self) -> String {
        let mut line = self.renderer.to_string_lossy().to_string();
        for arg in self.render_args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_args_without_options() {
        let req = RenderRequest::new("/usr/bin/renderer", "/tmp/scene.mlt", "/tmp/out.mp4");
        assert_eq!(req.render_args(), vec!["/tmp/scene.mlt", "-progress"]);
        assert!(!req.has_subtitle_pass());
    }

    #[test]
    fn test_render_args_with_range_and_subtitles() {
        let req = RenderRequest::new("melt", "/tmp/scene.mlt", "/tmp/out.mp4")
            .frame_range(10, 109)
            .subtitle_file("/tmp/subs.srt")
            .extra_arg("-silent");

        let args = req.render_args();
        assert_eq!(args[0], "/tmp/scene.mlt");
        assert!(args.contains(&"in=10".to_string()));
        assert!(args.contains(&"out=109".to_string()));
        assert!(args.contains(&"av.filename=/tmp/out.subtitles.ass".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-silent"));
        assert_eq!(req.known_total_frames(), Some(100));
    }

    #[test]
    fn test_subtitle_args_write_intermediate() {
        let req = RenderRequest::new("melt", "/tmp/scene.mlt", "/tmp/out.mp4")
            .subtitle_file("/tmp/subs.srt");
        assert_eq!(
            req.subtitle_args(),
            vec!["-y", "-v", "error", "-i", "/tmp/subs.srt", "/tmp/out.subtitles.ass"]
        );
    }

    #[test]
    fn test_empty_subtitle_path_disables_pass() {
        let req = RenderRequest::new("melt", "a.mlt", "b.mp4").subtitle_file("");
        assert!(!req.has_subtitle_pass());
        assert!(!req.render_args().contains(&"-attach".to_string()));
    }

    #[test]
    fn test_total_frames_precedence() {
        let req = RenderRequest::new("melt", "a.mlt", "b.mp4")
            .frame_range(0, 99)
            .total_frames(250);
        assert_eq!(req.known_total_frames(), Some(250));

        let open = RenderRequest::new("melt", "a.mlt", "b.mp4");
        assert_eq!(open.known_total_frames(), None);
    }

    #[test]
    fn test_total_frames_at_frame_limit() {
        let mut req = RenderRequest::new("melt", "a.mlt", "b.mp4");
        req.out_frame = Some(u64::MAX);
        assert_eq!(req.known_total_frames(), None);

        req.in_frame = Some(0);
        assert_eq!(req.known_total_frames(), None);

        req.in_frame = Some(1);
        assert_eq!(req.known_total_frames(), Some(u64::MAX));
    }

    #[test]
    fn test_default_log_path() {
        let req = RenderRequest::new("melt", "a.mlt", "/tmp/out.mp4");
        assert_eq!(req.effective_log_path(), PathBuf::from("/tmp/out.mp4.log"));
        let req = req.log_path("/var/log/render.log");
        assert_eq!(req.effective_log_path(), PathBuf::from("/var/log/render.log"));
    }
}
