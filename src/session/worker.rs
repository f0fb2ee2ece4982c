//! Runs one computation on a scoped worker thread while the calling
//! thread forwards its progress to a [`ProgressSink`].

use crate::progress::{ProgressCallback, ProgressEvent, ProgressReporter, ProgressSink};
use std::sync::mpsc::channel;
use std::sync::Arc;

/// Runs `work` on a worker that may borrow from the caller. Progress
/// events travel over a channel and reach `sink` on this thread; the
/// result is returned once the worker has joined.
pub(crate) fn run_on_worker<T, F>(total: usize, sink: &dyn ProgressSink, work: F) -> T
where
    T: Send,
    F: FnOnce(&ProgressReporter) -> T + Send,
{
    let (tx, rx) = channel::<ProgressEvent>();

    std::thread::scope(|s| {
        let handle = s.spawn(move || {
            let callback: ProgressCallback = Arc::new(move |event| {
                // Receiver gone means nobody is listening anymore.
                let _ = tx.send(event);
            });
            let reporter = ProgressReporter::new(Some(callback), total);
            work(&reporter)
        });

        // Ends when the reporter (and with it the sender) is dropped.
        for event in rx {
            match event {
                ProgressEvent::Started { operation, total } => {
                    sink.status(operation);
                    sink.progress(0, total);
                }
                ProgressEvent::Advanced { current, total } => sink.progress(current, total),
                ProgressEvent::Status { message } => sink.status(&message),
            }
        }

        handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    })
}
