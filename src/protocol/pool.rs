//! Connection pools.
//!
//! Both pools hand a [`Connection`] to one borrower at a time and take it
//! back when the borrow ends, whether the action succeeded, failed or
//! panicked.
//!
//! # Retirement
//!
//! A connection that comes back broken (see [`Connection::is_broken`]) or
//! closed is never handed out again. It is shut down and its slot is left
//! vacant; the next borrower drawing that vacancy opens a replacement
//! through the pool's connector. A slot therefore outlives the connections
//! that occupy it, and the slot count of a pool is what [`Pool::size`]
//! reports.
use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
    mpsc::{self, Receiver, SyncSender},
};

use log::{debug, info, warn};

use super::{Connect, Connection, Error, Fault, Transport};

/// Shared access to a set of connections.
pub trait Pool {
    type Transport: Transport;

    /// Runs `action` against a pooled connection and returns it afterwards.
    fn borrow<F, R>(&self, action: F) -> Result<R, Error>
    where
        F: FnOnce(&Connection<Self::Transport>) -> Result<R, Error>;

    /// Number of slots, occupied or vacant.
    fn size(&self) -> usize;

    /// Number of open connections waiting for a borrower.
    fn idle(&self) -> usize;
}

/// A pool slot; `None` is a vacancy left by a retired connection.
type Slot<T> = Option<Connection<T>>;

trait Restore<T: Transport> {
    fn restore(&self, slot: Slot<T>);
}

/// A slot on loan. Dropping it hands the slot back to its pool.
struct Lease<'a, T: Transport, P: Restore<T>> {
    pool: &'a P,
    slot: Slot<T>,
}

impl<'a, T: Transport, P: Restore<T>> Lease<'a, T, P> {
    fn new(pool: &'a P, slot: Slot<T>) -> Self {
        Self { pool, slot }
    }

    /// The leased connection, opened first if the slot was vacant.
    fn checkout<C>(&mut self, connector: &C) -> Result<&Connection<T>, Error>
    where
        C: Connect<Transport = T>,
    {
        let conn = match self.slot.take() {
            Some(conn) => conn,
            None => {
                debug!("refilling a vacant pool slot");
                Connection::open(connector)?
            }
        };
        Ok(&*self.slot.insert(conn))
    }
}

impl<T: Transport, P: Restore<T>> Drop for Lease<'_, T, P> {
    fn drop(&mut self) {
        let slot = self.slot.take().and_then(retire);
        self.pool.restore(slot);
    }
}

fn retire<T: Transport>(conn: Connection<T>) -> Slot<T> {
    if !conn.is_open() {
        warn!("retiring closed connection {}", conn.id());
        return None;
    }
    if conn.is_broken() {
        warn!("retiring broken connection {}", conn.id());
        if let Err(e) = conn.close() {
            debug!("failed to shut down connection {}: {e}", conn.id());
        }
        return None;
    }
    Some(conn)
}

fn open_all<C: Connect>(
    connector: &C,
    count: usize,
) -> Result<Vec<Connection<C::Transport>>, Error> {
    (0..count).map(|_| Connection::open(connector)).collect()
}

/// A pool with a fixed number of slots; `borrow` blocks while all are lent.
pub struct FixedPool<C: Connect> {
    connector: C,
    size: usize,
    idle: AtomicUsize,
    sender: SyncSender<Slot<C::Transport>>,
    receiver: Mutex<Receiver<Slot<C::Transport>>>,
}

impl<C: Connect> FixedPool<C> {
    /// Opens `size` connections up front.
    ///
    /// # Panics
    ///
    /// If `size` is zero.
    pub fn new(connector: C, size: usize) -> Result<Self, Error> {
        assert!(size > 0);

        let (sender, receiver) = mpsc::sync_channel(size);
        for conn in open_all(&connector, size)? {
            // Capacity equals the slot count, so this never blocks.
            sender.send(Some(conn)).map_err(|_| Fault::Closed)?;
        }
        info!("fixed pool ready with {size} connections");

        Ok(Self {
            connector,
            size,
            idle: AtomicUsize::new(size),
            sender,
            receiver: Mutex::new(receiver),
        })
    }
}

impl<C: Connect> Restore<C::Transport> for FixedPool<C> {
    fn restore(&self, slot: Slot<C::Transport>) {
        if slot.is_some() {
            self.idle.fetch_add(1, Ordering::AcqRel);
        }
        if self.sender.send(slot).is_err() {
            warn!("fixed pool lost a slot");
        }
    }
}

impl<C: Connect> Pool for FixedPool<C> {
    type Transport = C::Transport;

    fn borrow<F, R>(&self, action: F) -> Result<R, Error>
    where
        F: FnOnce(&Connection<Self::Transport>) -> Result<R, Error>,
    {
        let slot = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv()
            .map_err(|_| Fault::Closed)?;
        if slot.is_some() {
            self.idle.fetch_sub(1, Ordering::AcqRel);
        }

        let mut lease = Lease::new(self, slot);
        let conn = lease.checkout(&self.connector)?;
        debug!("leased connection {}", conn.id());
        action(conn)
    }

    fn size(&self) -> usize {
        self.size
    }

    fn idle(&self) -> usize {
        self.idle.load(Ordering::Acquire)
    }
}

impl<C: Connect> Drop for FixedPool<C> {
    fn drop(&mut self) {
        let receiver = self.receiver.get_mut().unwrap_or_else(PoisonError::into_inner);
        for conn in receiver.try_iter().flatten() {
            if let Err(e) = conn.close() {
                debug!("failed to shut down connection {}: {e}", conn.id());
            }
        }
    }
}

/// A pool that never makes a borrower wait.
///
/// When every slot is lent, `borrow` adds a slot and opens a connection for
/// it. Slots are never removed: a burst of concurrent borrowers permanently
/// raises the number of connections held open.
pub struct GrowablePool<C: Connect> {
    connector: C,
    size: AtomicUsize,
    slots: Mutex<Vec<Slot<C::Transport>>>,
}

impl<C: Connect> GrowablePool<C> {
    /// Opens `initial_size` connections up front; zero is allowed.
    pub fn new(connector: C, initial_size: usize) -> Result<Self, Error> {
        let slots = open_all(&connector, initial_size)?
            .into_iter()
            .map(Some)
            .collect::<Vec<_>>();

        Ok(Self {
            connector,
            size: AtomicUsize::new(initial_size),
            slots: Mutex::new(slots),
        })
    }

    /// Takes an idle connection if there is one, a vacancy otherwise.
    fn take(&self) -> Option<Slot<C::Transport>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.iter().position(Option::is_some) {
            Some(i) => Some(slots.swap_remove(i)),
            None => slots.pop(),
        }
    }
}

impl<C: Connect> Restore<C::Transport> for GrowablePool<C> {
    fn restore(&self, slot: Slot<C::Transport>) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(slot);
    }
}

impl<C: Connect> Pool for GrowablePool<C> {
    type Transport = C::Transport;

    fn borrow<F, R>(&self, action: F) -> Result<R, Error>
    where
        F: FnOnce(&Connection<Self::Transport>) -> Result<R, Error>,
    {
        let slot = match self.take() {
            Some(slot) => slot,
            None => {
                let size = self.size.fetch_add(1, Ordering::AcqRel) + 1;
                info!("growable pool grew to {size} slots");
                None
            }
        };

        let mut lease = Lease::new(self, slot);
        let conn = lease.checkout(&self.connector)?;
        debug!("leased connection {}", conn.id());
        action(conn)
    }

    fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    fn idle(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Read, Write},
        panic::{self, AssertUnwindSafe},
        sync::Arc,
        thread,
        time::Duration,
    };

    use super::*;
    use crate::{Status, Value, cmd};

    const PONG: &[u8] = b"+PONG\r\n";
    const GARBAGE: &[u8] = b"!oops\r\n";

    /// Answers every request with the same canned reply.
    struct Canned {
        reply: &'static [u8],
        pos: usize,
    }

    impl Read for Canned {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            for byte in buf.iter_mut() {
                *byte = self.reply[self.pos];
                self.pos = (self.pos + 1) % self.reply.len();
            }
            Ok(buf.len())
        }
    }

    impl Write for Canned {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for Canned {
        fn shutdown(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A connector whose first `bad` connections reply with garbage.
    fn connector(bad: usize) -> (impl Connect<Transport = Canned>, Arc<AtomicUsize>) {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opened);
        let connector = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let reply = if n < bad { GARBAGE } else { PONG };
            Ok::<_, io::Error>(Canned { reply, pos: 0 })
        };
        (connector, opened)
    }

    fn ping(conn: &Connection<Canned>) -> Result<String, Error> {
        conn.execute(&cmd!["PING"], Status)
    }

    #[test]
    fn fixed_pool_keeps_its_size() {
        let (connector, opened) = connector(0);
        let pool = Arc::new(FixedPool::new(connector, 3).unwrap());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles = (0..8)
            .map(|_| {
                let (pool, active, peak) =
                    (Arc::clone(&pool), Arc::clone(&active), Arc::clone(&peak));
                thread::spawn(move || {
                    for _ in 0..50 {
                        let reply = pool
                            .borrow(|conn| {
                                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                                peak.fetch_max(now, Ordering::SeqCst);
                                let reply = ping(conn);
                                active.fetch_sub(1, Ordering::SeqCst);
                                reply
                            })
                            .unwrap();
                        assert_eq!(reply, "PONG");
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.size(), 3);
        assert_eq!(pool.idle(), 3);
        assert_eq!(opened.load(Ordering::SeqCst), 3);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn fixed_pool_blocks_until_returned() {
        let (connector, _) = connector(0);
        let pool = Arc::new(FixedPool::new(connector, 1).unwrap());
        let (release, released) = mpsc::channel::<()>();
        let (taken, wait_taken) = mpsc::channel::<()>();

        let holder = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                pool.borrow(|conn| {
                    taken.send(()).unwrap();
                    let _ = released.recv_timeout(Duration::from_secs(5));
                    ping(conn)
                })
            })
        };
        wait_taken.recv().unwrap();
        assert_eq!(pool.idle(), 0);

        release.send(()).unwrap();
        assert_eq!(pool.borrow(ping).unwrap(), "PONG");
        assert_eq!(holder.join().unwrap().unwrap(), "PONG");
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn failed_action_still_returns_connection() {
        let (connector, _) = connector(0);
        let pool = FixedPool::new(connector, 2).unwrap();

        let result: Result<(), Error> = pool.borrow(|_| Err(Error::Remote("ERR nope".into())));

        assert!(matches!(result, Err(Error::Remote(_))));
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn panicking_action_still_returns_connection() {
        let (connector, opened) = connector(0);
        let pool = FixedPool::new(connector, 1).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pool.borrow(|_| -> Result<(), Error> { panic!("boom") })
        }));

        assert!(result.is_err());
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.borrow(ping).unwrap(), "PONG");
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fixed_pool_retires_broken_connection() {
        let (connector, opened) = connector(1);
        let pool = FixedPool::new(connector, 1).unwrap();

        let err = pool.borrow(|conn| conn.call(&cmd!["PING"])).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.idle(), 0);

        let reply = pool.borrow(|conn| conn.call(&cmd!["PING"])).unwrap();
        assert_eq!(reply, Value::Status("PONG".into()));
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn fixed_pool_retires_closed_connection() {
        let (connector, opened) = connector(0);
        let pool = FixedPool::new(connector, 1).unwrap();

        pool.borrow(|conn| conn.close()).unwrap();
        assert_eq!(pool.idle(), 0);

        assert_eq!(pool.borrow(ping).unwrap(), "PONG");
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn vacancy_survives_failed_reconnect() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let connector = move || match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(Canned { reply: GARBAGE, pos: 0 }),
            1 => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
            _ => Ok(Canned { reply: PONG, pos: 0 }),
        };
        let pool = FixedPool::new(connector, 1).unwrap();

        assert!(pool.borrow(ping).unwrap_err().is_fatal());
        assert!(matches!(
            pool.borrow(ping),
            Err(Error::Fault(Fault::Io(_)))
        ));
        assert_eq!(pool.borrow(ping).unwrap(), "PONG");
    }

    #[test]
    fn growable_pool_grows_on_demand() {
        let (connector, opened) = connector(0);
        let pool = GrowablePool::new(connector, 1).unwrap();

        let (outer, inner) = pool
            .borrow(|a| pool.borrow(|b| Ok((a.id(), b.id()))))
            .unwrap();

        assert_ne!(outer, inner);
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.idle(), 2);
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn growable_pool_never_shrinks() {
        let (connector, _) = connector(0);
        let pool = Arc::new(GrowablePool::new(connector, 0).unwrap());

        let handles = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..50 {
                        pool.borrow(ping).unwrap();
                        let size = pool.size();
                        assert!(size >= last);
                        last = size;
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let size = pool.size();
        assert!((1..=8).contains(&size));
        assert_eq!(pool.idle(), size);
    }

    #[test]
    fn growable_pool_prefers_open_connections() {
        let (connector, opened) = connector(1);
        let pool = GrowablePool::new(connector, 2).unwrap();

        // Find and retire the garbage connection, leaving a vacancy behind.
        while pool.idle() == 2 {
            let _ = pool.borrow(ping);
        }
        assert_eq!(pool.idle(), 1);

        assert_eq!(pool.borrow(ping).unwrap(), "PONG");
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert_eq!(pool.size(), 2);
    }
}
