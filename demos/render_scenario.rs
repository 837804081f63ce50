//! Render a reference telemetry message as a text pressure map

use plantar_flux::pipeline::FrameProcessor;
use plantar_flux::render::{AsciiRenderer, Renderer};
use plantar_flux::{FootLayout, FootOutline, ReconstructionConfig};

fn main() {
    let message = "Steps: 3, Channel 0: 120, Channel 5: 200";

    for sigma in [1.0, 1.5] {
        let mut processor = FrameProcessor::with_context(
            FootLayout::default(),
            FootOutline::default(),
            ReconstructionConfig::with_sigma(sigma),
        );
        let frame = processor.process(message, None);
        println!("sigma {sigma}: local maxima at {:?}", frame.field.local_maxima());

        let mut renderer = AsciiRenderer::new(std::io::stdout());
        if let Err(e) = renderer.render(&frame) {
            eprintln!("Error: {e}");
        }
    }
}
