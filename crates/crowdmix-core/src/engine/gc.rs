//! RT-safe garbage collection for stem audio
//!
//! A global `basedrop` collector lives on a dedicated thread. When the mix
//! bus drops a replaced stem, the `Shared<PreparedStem>` only enqueues the
//! pointer; the multi-megabyte buffer is freed on the GC thread instead of
//! inside the audio callback.
//!
//! ```ignore
//! let prepared = Shared::new(&gc_handle(), prepared_stem);
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle for creating `Shared<T>` allocations
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread reclaims deferred drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("audio-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it is created on the thread that owns it
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Audio GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn audio GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Handle for wrapping values in `Shared<T>`
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Shared;

    #[test]
    fn test_shared_clone_and_drop() {
        let data = Shared::new(&gc_handle(), vec![0.5f32; 1024]);
        let other = Shared::clone(&data);
        assert_eq!(other.len(), 1024);
        drop(data);
        assert_eq!(other[0], 0.5);
    }
}
