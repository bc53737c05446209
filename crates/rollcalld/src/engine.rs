use rollcall_core::encoding_store::StoreError;
use rollcall_core::frame_recognizer::RecognizeError;
use rollcall_core::{
    BgrImage, DistanceMatcher, EncodingStore, FrameRecognizer, MatchResult, OnnxFaceAnalyzer, Settings,
};
use rollcall_hw::{Camera, CameraError, CameraStream};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("frame read failed: {0}")]
    FrameRead(#[source] CameraError),
    #[error("model error: {0}")]
    Analyzer(#[from] rollcall_core::analyzer::AnalyzerError),
    #[error("{0}")]
    IncompatibleStore(#[from] StoreError),
    #[error("recognition failed: {0}")]
    Recognize(#[from] RecognizeError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Match results for one captured frame.
#[derive(Debug, Clone)]
pub struct TickFrame {
    pub sequence: u32,
    pub faces: Vec<MatchResult>,
}

/// What the engine thread needs to start, taken from [`Settings`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub camera_device: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub model_dir: PathBuf,
    pub downscale: f32,
    pub match_tolerance: f32,
    pub warmup_frames: usize,
}

impl From<&Settings> for EngineConfig {
    fn from(s: &Settings) -> Self {
        Self {
            camera_device: s.camera_device.clone(),
            frame_width: s.frame_width,
            frame_height: s.frame_height,
            model_dir: s.model_dir.clone(),
            downscale: s.downscale,
            match_tolerance: s.match_tolerance,
            warmup_frames: s.warmup_frames,
        }
    }
}

enum EngineRequest {
    Recognize {
        reply: oneshot::Sender<Result<TickFrame, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Capture one frame and match every face in it.
    pub async fn recognize(&self) -> Result<TickFrame, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// State owned by the engine thread. The stream is declared first so it is
/// released before the device.
struct Engine {
    stream: CameraStream,
    _camera: Camera,
    recognizer: FrameRecognizer<OnnxFaceAnalyzer>,
    store: EncodingStore,
}

impl Engine {
    fn start(config: &EngineConfig, store: EncodingStore) -> Result<Self, EngineError> {
        let camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)?;
        tracing::info!(
            device = %config.camera_device,
            width = camera.width,
            height = camera.height,
            fourcc = ?camera.fourcc,
            "camera opened"
        );

        let analyzer = OnnxFaceAnalyzer::load(&config.model_dir)?;
        let recognizer = FrameRecognizer::new(
            analyzer,
            DistanceMatcher::new(config.match_tolerance),
            config.downscale,
        );
        store.check_compatible(recognizer.analyzer())?;
        tracing::info!(
            dir = %config.model_dir.display(),
            downscale = recognizer.downscale(),
            "face models loaded"
        );

        let mut stream = camera.stream()?;
        if config.warmup_frames > 0 {
            tracing::info!(count = config.warmup_frames, "discarding warmup frames");
            stream.discard(config.warmup_frames);
        }

        Ok(Self {
            stream,
            _camera: camera,
            recognizer,
            store,
        })
    }

    fn recognize(&mut self) -> Result<TickFrame, EngineError> {
        let frame = self.stream.next_frame().map_err(EngineError::FrameRead)?;
        let sequence = frame.sequence;
        let captured = frame.timestamp;
        let image = BgrImage::from_raw(frame.width, frame.height, frame.data)?;
        let faces = self.recognizer.recognize(&image, &self.store)?;
        tracing::trace!(
            sequence,
            faces = faces.len(),
            latency_ms = captured.elapsed().as_millis() as u64,
            "frame recognized"
        );
        Ok(TickFrame { sequence, faces })
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The camera and both ONNX models are opened on that thread; this call
/// blocks until they are ready and fails fast if any of them is not.
pub fn spawn_engine(config: EngineConfig, store: EncodingStore) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<(), EngineError>>(1);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            let mut engine = match Engine::start(&config, store) {
                Ok(engine) => {
                    let _ = ready_tx.send(Ok(()));
                    engine
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Recognize { reply } => {
                        let _ = reply.send(engine.recognize());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    ready_rx.recv().map_err(|_| EngineError::ChannelClosed)??;
    Ok(EngineHandle { tx })
}
