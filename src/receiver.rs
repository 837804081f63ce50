//! Receiver loop
//!
//! Reads frames from one connection, reconstructs each message and hands the
//! result to a renderer before reading the next. Rendering therefore
//! back-pressures ingestion through the transport's buffers.

use crate::config::ReceiverConfig;
use crate::error::PlantarError;
use crate::framing::FrameReader;
use crate::pipeline::FrameProcessor;
use crate::render::Renderer;
use std::io::Read;
use std::net::TcpListener;
use tracing::{debug, info};

/// Totals for one connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveSummary {
    pub frames_rendered: u64,
    /// Frames discarded by the length limit
    pub dropped_frames: u64,
    /// Step count of the last rendered frame
    pub last_steps: Option<u64>,
}

/// Receiver-side context for one connection
pub struct Receiver<R, D> {
    reader: FrameReader<R>,
    processor: FrameProcessor,
    renderer: D,
    peer: Option<String>,
}

impl<R: Read, D: Renderer> Receiver<R, D> {
    pub fn new(reader: FrameReader<R>, processor: FrameProcessor, renderer: D) -> Self {
        Self {
            reader,
            processor,
            renderer,
            peer: None,
        }
    }

    /// Build a receiver for a stream using the configured framing and context
    pub fn from_config(stream: R, config: &ReceiverConfig, renderer: D) -> Self {
        let reader = FrameReader::with_limits(stream, config.framing, config.recv_buffer, config.max_frame_len);
        Self::new(reader, FrameProcessor::from_config(config), renderer)
    }

    /// Tag frames with the remote address
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    /// Process frames until the peer closes the stream
    pub fn run(&mut self) -> Result<ReceiveSummary, PlantarError> {
        let mut summary = ReceiveSummary::default();
        while let Some(text) = self.reader.next_frame()? {
            if text.trim().is_empty() {
                continue;
            }
            debug!(peer = self.peer.as_deref(), "received {text}");
            let frame = self.processor.process(&text, self.peer.as_deref());
            self.renderer.render(&frame)?;
            summary.frames_rendered += 1;
            summary.last_steps = Some(frame.steps);
        }
        summary.dropped_frames = self.reader.dropped_frames();
        Ok(summary)
    }

    pub fn into_renderer(self) -> D {
        self.renderer
    }
}

/// Serve one connection on an already bound listener
pub fn serve_connection<D: Renderer>(
    listener: &TcpListener,
    config: &ReceiverConfig,
    renderer: &mut D,
) -> Result<ReceiveSummary, PlantarError> {
    let (stream, addr) = listener.accept().map_err(PlantarError::transport)?;
    info!(peer = %addr, "connection accepted");

    let mut receiver = Receiver::from_config(stream, config, renderer).with_peer(addr.to_string());
    let summary = receiver.run()?;
    info!(
        peer = %addr,
        frames = summary.frames_rendered,
        dropped = summary.dropped_frames,
        "connection closed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::framing::Framing;
    use crate::node::SensorNode;
    use crate::simulate::{SimulatedAccelerometer, SimulatedPressurePad};
    use crate::types::RenderFrame;
    use std::io::Cursor;
    use std::net::TcpStream;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    /// Keeps every frame it is given
    #[derive(Default)]
    struct Collect {
        frames: Vec<RenderFrame>,
    }

    impl Renderer for Collect {
        fn render(&mut self, frame: &RenderFrame) -> Result<(), PlantarError> {
            self.frames.push(frame.clone());
            Ok(())
        }
    }

    fn cursor_receiver(bytes: &[u8], framing: Framing) -> Receiver<Cursor<Vec<u8>>, Collect> {
        let reader = FrameReader::new(Cursor::new(bytes.to_vec()), framing);
        Receiver::new(reader, FrameProcessor::new(), Collect::default())
    }

    #[test]
    fn test_renders_each_frame() {
        let mut receiver = cursor_receiver(
            b"Steps: 1, Channel 0: 10\nSteps: 2, Channel 0: 20\n",
            Framing::Newline,
        );
        let summary = receiver.run().unwrap();
        assert_eq!(summary.frames_rendered, 2);
        assert_eq!(summary.last_steps, Some(2));

        let frames = receiver.into_renderer().frames;
        assert_eq!(frames[0].title, "Foot Pressure Map - Steps: 1");
        assert_eq!(frames[1].provenance.sequence, 2);
    }

    #[test]
    fn test_empty_stream_renders_nothing() {
        let mut receiver = cursor_receiver(b"", Framing::Newline);
        assert_eq!(receiver.run().unwrap(), ReceiveSummary::default());
    }

    #[test]
    fn test_whitespace_frames_skipped() {
        let mut receiver = cursor_receiver(b"   \n\t\nSteps: 5\n", Framing::Newline);
        let summary = receiver.run().unwrap();
        assert_eq!(summary.frames_rendered, 1);
        assert_eq!(summary.last_steps, Some(5));
    }

    #[test]
    fn test_garbled_frame_still_rendered() {
        let mut receiver = cursor_receiver(b"\xff\xfe garbage\n", Framing::Newline);
        receiver.run().unwrap();
        let frames = receiver.into_renderer().frames;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].steps, 0);
        assert!(!frames[0].warnings.is_empty());
    }

    #[test]
    fn test_peer_recorded() {
        let mut receiver = cursor_receiver(b"Steps: 1\n", Framing::Newline).with_peer("192.168.1.20:40000");
        receiver.run().unwrap();
        let frames = receiver.into_renderer().frames;
        assert_eq!(frames[0].provenance.peer.as_deref(), Some("192.168.1.20:40000"));
    }

    #[test]
    fn test_loopback_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = thread::spawn(move || {
            let stream = TcpStream::connect(addr).unwrap();
            let config = NodeConfig::default();
            let mut node = SensorNode::from_config(
                SimulatedAccelerometer::default(),
                SimulatedPressurePad::default(),
                stream,
                &config,
            );
            let shutdown = AtomicBool::new(false);
            node.run(&shutdown, Duration::from_millis(1), Some(6)).unwrap()
            // Dropping the node closes the socket
        });

        let config = ReceiverConfig::default();
        let mut renderer = Collect::default();
        let summary = serve_connection(&listener, &config, &mut renderer).unwrap();
        let sent = sender.join().unwrap();

        assert_eq!(summary.frames_rendered, sent.messages_sent);
        assert_eq!(summary.last_steps, Some(sent.steps));
        let steps: Vec<u64> = renderer.frames.iter().map(|f| f.steps).collect();
        assert_eq!(steps, vec![0, 1, 1, 1, 1, 2]);
        assert!(renderer.frames.iter().all(|f| f.warnings.is_empty()));
    }
}
