//! Background persistence of thumbnails to the disk tier.
//!
//! Saves are queued on an unbounded channel and performed by one thread, so
//! callers never wait on disk I/O. Failures are logged and counted only.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use tracing::{debug, error, trace, warn};

use super::buffer::ThumbnailBuffer;
use super::disk::DiskCache;
use super::key::ThumbnailKey;
use super::stats::CacheStats;

enum WriteJob {
    Save(ThumbnailKey, ThumbnailBuffer),
    /// Acknowledged once every job queued before it has been handled.
    Flush(Sender<()>),
}

pub struct DiskWriter {
    tx: Option<Sender<WriteJob>>,
    handle: Option<JoinHandle<()>>,
}

impl DiskWriter {
    pub fn spawn(disk: Arc<DiskCache>, stats: Arc<CacheStats>) -> Self {
        let (tx, rx) = flume::unbounded();

        let handle = thread::Builder::new()
            .name("thumb-disk-writer".to_string())
            .spawn(move || writer_loop(rx, disk, stats));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = ?e, "Failed to spawn disk writer, thumbnails will not persist");
                None
            }
        };

        Self {
            tx: handle.as_ref().map(|_| tx),
            handle,
        }
    }

    /// Queue a thumbnail for saving. Never blocks.
    pub fn enqueue(&self, key: ThumbnailKey, buffer: ThumbnailBuffer) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(WriteJob::Save(key, buffer)).is_err() {
            warn!(%key, "Disk writer stopped, dropping thumbnail save");
        }
    }

    /// Block until every save queued so far has been attempted.
    pub fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (ack_tx, ack_rx) = flume::bounded(1);
        if tx.send(WriteJob::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    pub fn pending(&self) -> usize {
        self.tx.as_ref().map_or(0, |tx| tx.len())
    }
}

impl Drop for DiskWriter {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain what is queued and exit.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn writer_loop(rx: Receiver<WriteJob>, disk: Arc<DiskCache>, stats: Arc<CacheStats>) {
    debug!("Thumbnail disk writer started");

    while let Ok(job) = rx.recv() {
        match job {
            WriteJob::Save(key, buffer) => match disk.save(key, &buffer) {
                Ok(()) => {
                    stats.record_disk_write(true);
                    trace!(%key, "Persisted thumbnail");
                }
                Err(e) => {
                    stats.record_disk_write(false);
                    warn!(%key, error = %e, "Failed to persist thumbnail");
                }
            },
            WriteJob::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    debug!("Thumbnail disk writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use tempfile::tempdir;

    fn buffer() -> ThumbnailBuffer {
        ThumbnailBuffer::new(RgbaImage::new(8, 8))
    }

    #[test]
    fn test_flush_waits_for_saves() {
        let dir = tempdir().unwrap();
        let disk = Arc::new(DiskCache::new(dir.path(), None));
        let stats = Arc::new(CacheStats::default());
        let writer = DiskWriter::spawn(Arc::clone(&disk), Arc::clone(&stats));

        for id in 0..5 {
            writer.enqueue(ThumbnailKey::from_photo_id(id), buffer());
        }
        writer.flush();

        assert_eq!(writer.pending(), 0);
        assert_eq!(stats.snapshot().disk_writes, 5);
        assert!(disk.contains(ThumbnailKey::from_photo_id(4)));
    }

    #[test]
    fn test_drop_drains_queue() {
        let dir = tempdir().unwrap();
        let disk = Arc::new(DiskCache::new(dir.path(), None));
        let stats = Arc::new(CacheStats::default());

        let writer = DiskWriter::spawn(Arc::clone(&disk), Arc::clone(&stats));
        writer.enqueue(ThumbnailKey::from_photo_id(1), buffer());
        drop(writer);

        assert!(disk.contains(ThumbnailKey::from_photo_id(1)));
    }

    #[test]
    fn test_failed_save_is_counted() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let stats = Arc::new(CacheStats::default());
        let writer = DiskWriter::spawn(Arc::new(DiskCache::new(&blocker, None)), Arc::clone(&stats));
        writer.enqueue(ThumbnailKey::from_photo_id(1), buffer());
        writer.flush();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.disk_writes, 0);
        assert_eq!(snapshot.disk_write_failures, 1);
    }
}
