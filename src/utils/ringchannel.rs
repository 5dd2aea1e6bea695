//! Broadcast channel with one ring buffer per receiver.
//!
//! Writers never block: a bounded receiver that falls behind loses its oldest
//! elements and counts them as overruns. The channel closes when the last
//! sender is dropped; receivers drain what is left and then get `Closed`.

use std::{
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use ringbuffer::{AllocRingBuffer, GrowableAllocRingBuffer, RingBuffer};
use thiserror::Error;

use super::capacity::Capacity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("The channel was closed (no sender)")]
    Closed,

    #[error("No data available in channel")]
    Empty,
}

#[derive(Debug)]
enum Buffer<T> {
    Bounded(AllocRingBuffer<T>),
    Unbounded(GrowableAllocRingBuffer<T>),
}

impl<T> Buffer<T> {
    fn new(capacity: Capacity) -> Self {
        match capacity {
            Capacity::Bounded(c) => Buffer::Bounded(AllocRingBuffer::new(c.get())),
            Capacity::Unbounded => Buffer::Unbounded(GrowableAllocRingBuffer::new()),
        }
    }

    /// Returns true if the push overwrote the oldest element
    fn push(&mut self, value: T) -> bool {
        match self {
            Buffer::Bounded(b) => {
                let full = b.is_full();
                b.push(value);
                full
            }
            Buffer::Unbounded(b) => {
                b.push(value);
                false
            }
        }
    }

    fn dequeue(&mut self) -> Option<T> {
        match self {
            Buffer::Bounded(b) => b.dequeue(),
            Buffer::Unbounded(b) => b.dequeue(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Buffer::Bounded(b) => b.len(),
            Buffer::Unbounded(b) => b.len(),
        }
    }
}

#[derive(Debug)]
pub struct Channel<T> {
    inner: Mutex<ChannelInner<T>>,
}

#[derive(Debug)]
struct ChannelInner<T> {
    receivers: Vec<(usize, Arc<ReceiverShared<T>>)>,
    counter: usize,
    senders: usize,
    is_closed: bool,
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ChannelInner {
                receivers: vec![],
                counter: 0,
                senders: 0,
                is_closed: false,
            }),
        }
    }
}

impl<T: Clone> Channel<T> {
    fn write(&self, data: T) {
        let inner = self.inner.lock().unwrap();

        for (_, receiver) in inner.receivers.iter() {
            receiver.write(data.clone());
        }
    }
}

impl<T> Channel<T> {
    pub fn add_sender(this: &Arc<Channel<T>>) -> Sender<T> {
        let mut inner = this.inner.lock().unwrap();
        inner.senders += 1;

        Sender {
            channel: this.clone(),
        }
    }

    pub fn add_receiver(capacity: Capacity, this: &Arc<Channel<T>>) -> Receiver<T> {
        let mut inner = this.inner.lock().unwrap();

        let index = inner.counter;
        inner.counter += 1;

        let shared = Arc::new(ReceiverShared::new(capacity, inner.is_closed));
        inner.receivers.push((index, shared.clone()));

        Receiver {
            shared,
            channel_index: index,
            capacity,
            channel: this.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().is_closed
    }

    fn remove_receiver(&self, index: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.receivers.retain(|(i, _)| *i != index);
    }

    fn release_sender(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.senders -= 1;

        if inner.senders > 0 {
            return;
        }

        inner.is_closed = true;

        for (_, recv) in inner.receivers.iter() {
            recv.inner.lock().unwrap().closed = true;
            recv.cv.notify_all();
        }
    }

    #[cfg(test)]
    fn num_receivers(&self) -> usize {
        self.inner.lock().unwrap().receivers.len()
    }
}

#[derive(Debug)]
struct ReceiverShared<T> {
    inner: Mutex<ReceiverInner<T>>,
    cv: Condvar,
}

#[derive(Debug)]
struct ReceiverInner<T> {
    buf: Buffer<T>,
    closed: bool,
    overruns: usize,
}

impl<T> ReceiverShared<T> {
    fn new(capacity: Capacity, closed: bool) -> Self {
        Self {
            inner: Mutex::new(ReceiverInner {
                buf: Buffer::new(capacity),
                closed,
                overruns: 0,
            }),
            cv: Condvar::default(),
        }
    }

    fn write(&self, data: T) {
        let mut inner = self.inner.lock().unwrap();
        if inner.buf.push(data) {
            inner.overruns += 1;
        }

        self.cv.notify_one();
    }
}

#[derive(Debug)]
pub struct Sender<T> {
    channel: Arc<Channel<T>>,
}

impl<T: Clone> Sender<T> {
    pub fn send(&self, val: T) {
        self.channel.write(val);
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Channel::add_sender(&self.channel)
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.channel.release_sender();
    }
}

#[derive(Debug)]
pub struct Receiver<T> {
    shared: Arc<ReceiverShared<T>>,
    channel_index: usize,
    capacity: Capacity,
    channel: Arc<Channel<T>>,
}

impl<T> Receiver<T> {
    pub fn recv(&self) -> Result<T, ChannelError> {
        let inner = self.shared.inner.lock().unwrap();

        let mut inner = self
            .shared
            .cv
            .wait_while(inner, |inner| inner.buf.len() == 0 && !inner.closed)
            .unwrap();

        inner.buf.dequeue().ok_or(ChannelError::Closed)
    }

    /// Like `recv`, but gives up with `Empty` once `timeout` has elapsed
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, ChannelError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock().unwrap();

        loop {
            if let Some(v) = inner.buf.dequeue() {
                return Ok(v);
            }
            if inner.closed {
                return Err(ChannelError::Closed);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ChannelError::Empty);
            }

            inner = self.shared.cv.wait_timeout(inner, deadline - now).unwrap().0;
        }
    }

    pub fn try_recv(&self) -> Result<T, ChannelError> {
        let mut inner = self.shared.inner.lock().unwrap();

        match inner.buf.dequeue() {
            Some(v) => Ok(v),
            None if inner.closed => Err(ChannelError::Closed),
            None => Err(ChannelError::Empty),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().unwrap().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of elements discarded because this receiver was full
    pub fn overruns(&self) -> usize {
        self.shared.inner.lock().unwrap().overruns
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn clone_with_capacity(&self, capacity: Capacity) -> Self {
        Channel::add_receiver(capacity, &self.channel)
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.clone_with_capacity(self.capacity)
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.channel.remove_receiver(self.channel_index);
    }
}

pub fn channel<T>(capacity: Capacity) -> (Sender<T>, Receiver<T>) {
    let channel = Arc::new(Channel::<T>::default());

    let receiver = Channel::add_receiver(capacity, &channel);
    let sender = Channel::add_sender(&channel);

    (sender, receiver)
}
