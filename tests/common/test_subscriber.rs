use std::{
    io,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::dispatcher::DefaultGuard;
use tracing_subscriber::{fmt::MakeWriter, util::SubscriberInitExt};

#[derive(Clone)]
pub struct MakeMemoryWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

pub struct GuardWrapper<'a>(MutexGuard<'a, Vec<u8>>);

impl<'a> io::Write for GuardWrapper<'a> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for MakeMemoryWriter {
    type Writer = GuardWrapper<'a>;
    fn make_writer(&'a self) -> Self::Writer {
        self.buffer
            .lock()
            .map(GuardWrapper)
            .expect("memory writer mutex was poisoned")
    }
}

/// Captures everything `batchup` logs on the current thread.
pub struct MemorySubscriber {
    writer: MakeMemoryWriter,
    _guard: DefaultGuard,
}

impl MemorySubscriber {
    pub fn new(verbosity: u8) -> Self {
        let writer = MakeMemoryWriter {
            buffer: Arc::new(Mutex::new(Vec::new())),
        };
        let subscriber = batchup::logging::subscriber_builder(verbosity)
            .with_writer(writer.clone())
            .finish();
        let guard = subscriber.set_default();
        MemorySubscriber {
            writer,
            _guard: guard,
        }
    }

    pub fn output(&self) -> String {
        let buffer = self
            .writer
            .buffer
            .lock()
            .expect("memory writer lock was poisoned");
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn clear(&self) {
        self.writer
            .buffer
            .lock()
            .expect("memory writer lock was poisoned")
            .clear();
    }
}

impl Default for MemorySubscriber {
    fn default() -> Self {
        Self::new(2)
    }
}
