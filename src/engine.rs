//! Render orchestration on a fixed worker pool.
//!
//! [`RenderEngine::render`] validates everything it can without touching the
//! source stream, then hands the decode to a pool worker and returns a
//! [`RenderTask`]. On the worker the protocol is: check the stop token,
//! open the stream, verify it holds enough bytes, seek to the data offset,
//! decode. The stream is dropped on every path out of the worker.

use std::io::{Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};

use almost_enough::Stopper;
use enough::{Stop, StopReason};
use log::{debug, error};
use rayon::{ThreadPool, ThreadPoolBuilder};
use whereat::at;

use crate::bitmap::BitmapBuffer;
use crate::config::EngineConfig;
use crate::convert::convert_bitmap;
use crate::error::{RenderError, Result, io_error};
use crate::format::{ImagePlaneOptions, ImageRenderingOptions};
use crate::render::{DecodeContext, ImageRenderer, RenderOutcome};
use crate::source::ImageSource;

/// Stop token of one task: its own [`Stopper`] or the caller's token.
struct TaskStop {
    own: Stopper,
    caller: Box<dyn Stop + Send + Sync>,
}

impl Stop for TaskStop {
    fn check(&self) -> core::result::Result<(), StopReason> {
        self.own.check()?;
        self.caller.check()
    }
}

/// Runs renders on a fixed pool of worker threads.
pub struct RenderEngine {
    pool: ThreadPool,
    config: EngineConfig,
}

impl RenderEngine {
    /// Build the worker pool described by `config`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let prefix = config.thread_name_prefix().to_owned();
        let threads = config.worker_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .panic_handler(|_| error!("render worker panicked"))
            .build()
            .map_err(|e| at(RenderError::Pool(e)))?;
        debug!("render engine started with {threads} workers");
        Ok(Self { pool, config })
    }

    /// Engine with [`EngineConfig::default`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(EngineConfig::default())
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of pool workers.
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Checks that run before any work is scheduled.
    ///
    /// Destination format against the renderer's output, plane options
    /// against the format, then the configured limits. Only the file-size
    /// limit queries the source.
    pub fn validate(
        &self,
        renderer: &dyn ImageRenderer,
        source: &dyn ImageSource,
        dest: &BitmapBuffer,
        planes: &[ImagePlaneOptions],
    ) -> Result<()> {
        let expected = renderer.format().output;
        if dest.format() != expected {
            return Err(at(RenderError::FormatMismatch {
                expected,
                actual: dest.format(),
            }));
        }
        renderer.check_plane_options(dest.width(), planes)?;

        let limits = self.config.limits();
        limits
            .check_bitmap(&dest.layout())
            .map_err(|e| at(RenderError::Limit(e)))?;
        if limits.max_file_size.is_some() {
            limits
                .check_file_size(source.len()?)
                .map_err(|e| at(RenderError::Limit(e)))?;
        }
        Ok(())
    }

    /// Validate, then decode `source` into `dest` on a worker.
    ///
    /// Contract violations and limit failures are returned here, before any
    /// work is scheduled. Everything else arrives through
    /// [`RenderTask::wait`]. Both the source and the destination stay
    /// shared until the worker finishes.
    pub fn render<S>(
        &self,
        renderer: Arc<dyn ImageRenderer>,
        source: Arc<dyn ImageSource>,
        dest: &BitmapBuffer,
        options: ImageRenderingOptions,
        planes: Vec<ImagePlaneOptions>,
        stop: S,
    ) -> Result<RenderTask>
    where
        S: Stop + Send + Sync + 'static,
    {
        self.validate(&*renderer, &*source, dest, &planes)?;

        let own = Stopper::new();
        let task_stop = TaskStop {
            own: own.clone(),
            caller: Box::new(stop),
        };
        let finished = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let dest = dest.share();
        let done = Arc::clone(&finished);

        debug!(
            "submitting {} render into {}x{} {:?}",
            renderer.format().id,
            dest.width(),
            dest.height(),
            dest.format()
        );
        self.pool.spawn(move || {
            let result = execute(&*renderer, &*source, &dest, &options, &planes, &task_stop);
            match &result {
                Ok(outcome) => debug!("{} render finished: {outcome:?}", renderer.format().id),
                Err(e) => debug!("{} render failed: {e:?}", renderer.format().id),
            }
            // Release the destination share before the caller can observe completion.
            drop(dest);
            done.store(true, Ordering::Release);
            // The handle may already be gone.
            let _ = tx.send(result);
        });

        Ok(RenderTask {
            stop: own,
            finished,
            result: rx,
        })
    }

    /// [`render`](Self::render), then wait for the outcome.
    pub fn render_blocking<S>(
        &self,
        renderer: Arc<dyn ImageRenderer>,
        source: Arc<dyn ImageSource>,
        dest: &BitmapBuffer,
        options: ImageRenderingOptions,
        planes: Vec<ImagePlaneOptions>,
        stop: S,
    ) -> Result<RenderOutcome>
    where
        S: Stop + Send + Sync + 'static,
    {
        self.render(renderer, source, dest, options, planes, stop)?
            .wait()
    }

    /// Convert `src` into `dst` using this engine's workers.
    pub fn convert(
        &self,
        src: &BitmapBuffer,
        dst: &BitmapBuffer,
        stop: &(dyn Stop + Sync),
    ) -> Result<()> {
        self.pool.install(|| convert_bitmap(src, dst, stop))
    }
}

fn execute(
    renderer: &dyn ImageRenderer,
    source: &dyn ImageSource,
    dest: &BitmapBuffer,
    options: &ImageRenderingOptions,
    planes: &[ImagePlaneOptions],
    stop: &(dyn Stop + Sync),
) -> Result<RenderOutcome> {
    if stop.should_stop() {
        debug!("{} render cancelled before open", renderer.format().id);
        return Ok(RenderOutcome::Cancelled);
    }

    let mut stream = source.open()?;
    let available = stream.seek(SeekFrom::End(0)).map_err(io_error)?;
    let required =
        renderer.evaluate_source_data_size(dest.width(), dest.height(), options, planes)?;
    if available < required {
        return Err(at(RenderError::InsufficientData {
            required,
            available,
        }));
    }
    stream
        .seek(SeekFrom::Start(options.data_offset))
        .map_err(io_error)?;

    let ctx = DecodeContext {
        options,
        planes,
        stop,
    };
    match renderer.decode(&mut *stream, &mut dest.write(), &ctx) {
        Ok(()) => Ok(RenderOutcome::Completed),
        Err(e) if matches!(e.error(), RenderError::Cancelled(_)) => Ok(RenderOutcome::Cancelled),
        Err(e) => Err(e),
    }
}

/// Handle to a submitted render.
#[must_use = "dropping the task does not cancel it; call wait() or cancel()"]
pub struct RenderTask {
    stop: Stopper,
    finished: Arc<AtomicBool>,
    result: mpsc::Receiver<Result<RenderOutcome>>,
}

impl RenderTask {
    /// Request cancellation. The decode stops at its next check.
    pub fn cancel(&self) {
        self.stop.cancel();
    }

    /// Whether the worker has finished.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Block until the worker reports.
    pub fn wait(self) -> Result<RenderOutcome> {
        self.result
            .recv()
            .map_err(|_| at(RenderError::WorkerLost))?
    }
}

impl core::fmt::Debug for RenderTask {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RenderTask")
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
