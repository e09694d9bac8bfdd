//! Renderer stderr progress parsing.

/// A progress value recognized in one stderr line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressToken {
    /// `frame=<N>`
    Frame(u64),
    /// `percentage: <P>`
    Percent(u8),
    /// `Current Frame: <N>, percentage: <P>`
    FrameAndPercent { frame: u64, percent: u8 },
}

/// Scan a stderr line for a recognized progress token.
///
/// Returns `None` for anything else; such lines are plain log output.
pub fn parse_progress_line(line: &str) -> Option<ProgressToken> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix("Current Frame:") {
        let (frame_part, percent_part) = rest.split_once(',')?;
        let frame = parse_leading_number(frame_part)?;
        let percent = percent_part.trim().strip_prefix("percentage:")?;
        let percent = clamp_percent(parse_leading_number(percent)?);
        return Some(ProgressToken::FrameAndPercent { frame, percent });
    }

    if let Some(rest) = line.strip_prefix("frame=") {
        return parse_leading_number(rest).map(ProgressToken::Frame);
    }

    if let Some(rest) = line.strip_prefix("percentage:") {
        return parse_leading_number(rest).map(|p| ProgressToken::Percent(clamp_percent(p)));
    }

    None
}

/// Parse the number at the start of `s`, ignoring leading whitespace.
/// Anything after the digits (e.g. ` fps=25`) is ignored.
fn parse_leading_number(s: &str) -> Option<u64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok()
}

fn clamp_percent(value: u64) -> u8 {
    value.min(100) as u8
}

/// Percentage of `frames_done` over `total_frames`, rounded and clamped.
pub fn percent_of(frames_done: u64, total_frames: u64) -> u8 {
    if total_frames == 0 {
        return 0;
    }
    let pct = (frames_done as f64 / total_frames as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Frame counters and percentage for one render.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    in_frame: u64,
    out_frame: Option<u64>,
    total_frames: Option<u64>,
    current_frame: Option<u64>,
    percent: Option<u8>,
}

impl ProgressTracker {
    pub fn new(in_frame: Option<u64>, out_frame: Option<u64>, total_frames: Option<u64>) -> Self {
        Self {
            in_frame: in_frame.unwrap_or(0),
            out_frame,
            total_frames,
            current_frame: None,
            percent: None,
        }
    }

    /// Apply a token. Returns the new percentage when it changed.
    pub fn apply(&mut self, token: ProgressToken) -> Option<u8> {
        let next = match token {
            ProgressToken::Frame(frame) => {
                self.current_frame = Some(frame);
                self.total_frames
                    .map(|total| percent_of(frame.saturating_sub(self.in_frame), total))
            }
            ProgressToken::Percent(percent) => Some(percent),
            ProgressToken::FrameAndPercent { frame, percent } => {
                self.current_frame = Some(frame);
                Some(percent)
            }
        };

        match next {
            Some(pct) if self.percent != Some(pct) => {
                self.percent = Some(pct);
                Some(pct)
            }
            _ => None,
        }
    }

    /// Last reported percentage.
    pub fn percent(&self) -> Option<u8> {
        self.percent
    }

    /// Last frame seen on stderr.
    pub fn current_frame(&self) -> Option<u64> {
        self.current_frame
    }

    pub fn in_frame(&self) -> u64 {
        self.in_frame
    }

    pub fn out_frame(&self) -> Option<u64> {
        self.out_frame
    }

    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    /// Frames rendered so far, relative to the in point.
    pub fn frames_done(&self) -> u64 {
        self.current_frame
            .map(|f| f.saturating_sub(self.in_frame))
            .unwrap_or(0)
    }
}
