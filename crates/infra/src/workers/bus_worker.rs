use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use procura_events::{EventBus, Subscription};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Owner of a running bus worker.
///
/// Dropping the handle asks the worker to stop without waiting for it;
/// [`WorkerHandle::shutdown`] also joins the thread.
#[derive(Debug)]
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// A named thread that feeds every bus message to a handler.
///
/// The subscription is taken before `spawn` returns, so anything published
/// afterwards is seen. Handler errors are logged and the loop keeps going;
/// handlers must tolerate redelivery.
#[derive(Debug)]
pub struct BusWorker;

impl BusWorker {
    pub fn spawn<M, B, H, E>(name: &'static str, bus: &B, mut handler: H) -> std::io::Result<WorkerHandle>
    where
        M: Send + 'static,
        B: EventBus<M>,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let sub: Subscription<M> = bus.subscribe();

        let join = {
            let stop = stop.clone();
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || run(name, &sub, &stop, &mut handler))?
        };

        Ok(WorkerHandle {
            stop,
            join: Some(join),
        })
    }
}

fn run<M, H, E>(name: &'static str, sub: &Subscription<M>, stop: &AtomicBool, handler: &mut H)
where
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Display,
{
    let mut handled = 0u64;
    while !stop.load(Ordering::SeqCst) {
        match sub.recv_timeout(POLL_INTERVAL) {
            Ok(msg) => {
                handled += 1;
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = %err, "bus worker handler failed");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(worker = name, handled, "bus worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use procura_events::InMemoryEventBus;

    use super::*;

    #[test]
    fn handles_messages_until_shut_down() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let seen = seen.clone();
            BusWorker::spawn("test.worker", &bus, move |n: u32| {
                if n == 2 {
                    return Err("two is rejected");
                }
                seen.lock().unwrap().push(n);
                Ok(())
            })
            .unwrap()
        };

        for n in 1..=3 {
            bus.publish(n).unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.lock().unwrap().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        handle.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
    }
}
