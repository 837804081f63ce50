//! Renderers for reconstructed frames

use crate::error::PlantarError;
use crate::types::RenderFrame;
use std::io::Write;

/// Consumer of render frames, invoked once per decoded message
pub trait Renderer {
    fn render(&mut self, frame: &RenderFrame) -> Result<(), PlantarError>;
}

impl<D: Renderer + ?Sized> Renderer for &mut D {
    fn render(&mut self, frame: &RenderFrame) -> Result<(), PlantarError> {
        (**self).render(frame)
    }
}

impl<D: Renderer + ?Sized> Renderer for Box<D> {
    fn render(&mut self, frame: &RenderFrame) -> Result<(), PlantarError> {
        (**self).render(frame)
    }
}

/// Writes each frame as JSON
pub struct JsonLinesRenderer<W> {
    out: W,
    pretty: bool,
}

impl<W: Write> JsonLinesRenderer<W> {
    /// One compact JSON document per line
    pub fn ndjson(out: W) -> Self {
        Self { out, pretty: false }
    }

    pub fn pretty(out: W) -> Self {
        Self { out, pretty: true }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for JsonLinesRenderer<W> {
    fn render(&mut self, frame: &RenderFrame) -> Result<(), PlantarError> {
        let json = if self.pretty {
            serde_json::to_string_pretty(frame)?
        } else {
            serde_json::to_string(frame)?
        };
        writeln!(self.out, "{json}")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Intensity ramp, lightest first
const RAMP: &[u8] = b".:-=+*#%@";

const MARKER: char = 'o';

/// Text heat map of the clipped raster with sensor markers
pub struct AsciiRenderer<W> {
    out: W,
    row_stride: usize,
}

impl<W: Write> AsciiRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, row_stride: 2 }
    }

    /// Print every n-th raster row (terminal cells are taller than wide)
    pub fn with_row_stride(mut self, row_stride: usize) -> Self {
        self.row_stride = row_stride.max(1);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Character for a value on a `[lo, hi]` scale
fn shade(value: f64, lo: f64, hi: f64) -> char {
    let span = hi - lo;
    let t = if span > 0.0 { (value - lo) / span } else { 0.0 };
    let idx = (t * (RAMP.len() - 1) as f64).round() as usize;
    RAMP[idx.min(RAMP.len() - 1)] as char
}

/// Render a frame to lines of text
pub fn ascii_lines(frame: &RenderFrame, row_stride: usize) -> Vec<String> {
    let raster = &frame.raster;
    let (lo, hi) = raster
        .pixels
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let mut grid: Vec<Vec<char>> = (0..raster.height)
        .map(|py| {
            (0..raster.width)
                .map(|px| match raster.get(px, py) {
                    Some(v) => shade(v, lo, hi),
                    None => ' ',
                })
                .collect()
        })
        .collect();

    for marker in &frame.markers {
        let px = (marker.x * raster.resolution as f64).round() as usize;
        let py = (marker.y * raster.resolution as f64).round() as usize;
        if let Some(cell) = grid.get_mut(py).and_then(|row| row.get_mut(px)) {
            *cell = MARKER;
        }
    }

    let mut lines = vec![frame.title.clone()];
    lines.extend(
        grid.iter()
            .step_by(row_stride.max(1))
            .map(|row| row.iter().collect::<String>().trim_end().to_string()),
    );
    if hi.is_finite() {
        lines.push(format!("scale {lo:.1} '{}' .. {hi:.1} '{}'", RAMP[0] as char, RAMP[RAMP.len() - 1] as char));
    }
    for warning in &frame.warnings {
        lines.push(format!("warning: {warning}"));
    }
    lines
}

impl<W: Write> Renderer for AsciiRenderer<W> {
    fn render(&mut self, frame: &RenderFrame) -> Result<(), PlantarError> {
        for line in ascii_lines(frame, self.row_stride) {
            writeln!(self.out, "{line}")?;
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FrameProcessor;

    fn scenario_frame() -> RenderFrame {
        FrameProcessor::new().process("Steps: 3, Channel 0: 120, Channel 5: 200", None)
    }

    #[test]
    fn test_shade_ramp_ends() {
        assert_eq!(shade(0.0, 0.0, 10.0), '.');
        assert_eq!(shade(10.0, 0.0, 10.0), '@');
        assert_eq!(shade(4.0, 4.0, 4.0), '.');
    }

    #[test]
    fn test_ndjson_one_line_per_frame() {
        let mut renderer = JsonLinesRenderer::ndjson(Vec::new());
        let frame = scenario_frame();
        renderer.render(&frame).unwrap();
        renderer.render(&frame).unwrap();
        let text = String::from_utf8(renderer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["steps"], 3);
    }

    #[test]
    fn test_ascii_title_and_markers() {
        let frame = scenario_frame();
        let lines = ascii_lines(&frame, 1);
        assert_eq!(lines[0], "Foot Pressure Map - Steps: 3");
        // title, raster rows, scale
        assert_eq!(lines.len(), 1 + frame.raster.height + 1);

        let markers: usize = lines[1..=frame.raster.height]
            .iter()
            .map(|l| l.chars().filter(|c| *c == MARKER).count())
            .sum();
        assert_eq!(markers, frame.markers.len());
    }

    #[test]
    fn test_ascii_leaves_outside_blank() {
        let frame = scenario_frame();
        let lines = ascii_lines(&frame, 1);
        // Rightmost raster column lies beyond the outline on every row
        for line in &lines[1..=frame.raster.height] {
            assert!(line.chars().count() < frame.raster.width);
        }
    }

    #[test]
    fn test_ascii_renderer_writes_warnings() {
        let frame = FrameProcessor::new().process("no telemetry here", None);
        let mut renderer = AsciiRenderer::new(Vec::new());
        renderer.render(&frame).unwrap();
        let text = String::from_utf8(renderer.into_inner()).unwrap();
        assert!(text.starts_with("Foot Pressure Map - Steps: 0\n"));
        assert!(text.contains("warning: no step count found"));
    }
}
