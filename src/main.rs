use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Level};

use screenpilot::error::PipelineError;
use screenpilot::pipeline::types::{BoundingBox, DetectedObject, Frame, FusedAction};
use screenpilot::pipeline::{ActionExecutor, CaptureSource, Detector};
use screenpilot::{AppError, Configuration, ContextBuilder};

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

/// Synthetic frame source for running the pipeline without a device.
struct SyntheticCapture {
    counter: AtomicU64,
}

impl CaptureSource for SyntheticCapture {
    fn capture_frame(&self) -> Option<Frame> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(Frame::new(id, 64, 64, vec![0; 64 * 64]))
    }
}

/// Stand-in detector: rolls a simple scene each frame.
struct SyntheticDetector;

impl Detector for SyntheticDetector {
    fn detect_objects(&self, _frame: &Frame) -> Result<Vec<DetectedObject>, PipelineError> {
        let mut rng = rand::rng();
        let mut objects = Vec::new();
        let bounds = BoundingBox {
            x: 8.0,
            y: 8.0,
            width: 16.0,
            height: 16.0,
        };
        if rng.random_bool(0.3) {
            objects.push(DetectedObject {
                label: "enemy".to_string(),
                confidence: rng.random_range(0.5..1.0),
                bounds,
            });
        }
        if rng.random_bool(0.4) {
            objects.push(DetectedObject {
                label: "coin".to_string(),
                confidence: rng.random_range(0.4..0.9),
                bounds,
            });
        }
        objects.push(DetectedObject {
            label: "health_bar".to_string(),
            confidence: rng.random_range(0.3..1.0),
            bounds,
        });
        Ok(objects)
    }
}

struct LoggingExecutor;

impl ActionExecutor for LoggingExecutor {
    fn execute(&self, action: &FusedAction) -> bool {
        debug!(
            "executing {:?} from {:?} (confidence {:.2})",
            action.kind, action.source, action.confidence
        );
        true
    }
}

fn main() -> Result<(), AppError> {
    init_logging();

    let configuration = Configuration::load().unwrap_or_else(|e| {
        warn!("falling back to default configuration: {e}");
        Configuration::default()
    });

    let context = ContextBuilder::new(configuration)
        .capture(Arc::new(SyntheticCapture {
            counter: AtomicU64::new(0),
        }))
        .detector(Arc::new(SyntheticDetector))
        .executor(Arc::new(LoggingExecutor))
        .build()?;

    if !context.init.initialize_all().wait() {
        warn!("initialization failed, aborting");
        return Ok(());
    }

    if !context.pipeline.start() {
        warn!("pipeline failed to start");
        return Ok(());
    }

    // Demo run: ten seconds of synthetic frames, then a clean shutdown.
    std::thread::sleep(Duration::from_secs(10));

    let snapshot = context.pipeline.metrics().snapshot();
    info!(
        "session summary: {} actions, {:.1}% success, avg latency {:.1}ms, {:.1} fps",
        snapshot.total_actions,
        snapshot.success_rate,
        snapshot.average_latency_ms,
        snapshot.frames_per_second
    );

    context.pipeline.stop();
    Ok(())
}
