use std::{
    any::{Any, type_name},
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use thiserror::Error;

use crate::{
    core::time::Timestamp,
    utils::{
        capacity::Capacity,
        ringchannel::{Channel, ChannelError, Receiver, Sender},
    },
};

#[derive(PartialEq, Eq, Error, Debug)]
pub enum TelemetryError {
    #[error("Requested channel type '{requested}', but channel is a '{expected}'")]
    WrongChannelType { requested: String, expected: String },

    #[error("Trying to read from an empty channel")]
    EmptyChannel,

    #[error("Trying to read from a closed channel")]
    ClosedChannel,

    #[error("Cannot create more than one producer for a channel")]
    AlreadyHasProducer,

    #[error("Provided channel name '{0}' is not valid")]
    InvalidChannelName(String),
}

impl From<ChannelError> for TelemetryError {
    fn from(value: ChannelError) -> Self {
        match value {
            ChannelError::Closed => TelemetryError::ClosedChannel,
            ChannelError::Empty => TelemetryError::EmptyChannel,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timestamped<T>(pub Timestamp, pub T);

/// Producer side of a telemetry channel. Clones feed the same channel, which
/// is closed once every clone has been dropped.
#[derive(Debug)]
pub struct TelemetrySender<T> {
    sender: Sender<Timestamped<T>>,
}

impl<T> Clone for TelemetrySender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: 'static + Clone> TelemetrySender<T> {
    pub fn send(&self, timestamp: Timestamp, value: T) {
        self.sender.send(Timestamped(timestamp, value));
    }
}

#[derive(Debug)]
pub struct TelemetryReceiver<T> {
    receiver: Receiver<Timestamped<T>>,
}

impl<T> TelemetryReceiver<T> {
    pub fn recv(&self) -> Result<Timestamped<T>, TelemetryError> {
        Ok(self.receiver.recv()?)
    }

    pub fn try_recv(&self) -> Result<Timestamped<T>, TelemetryError> {
        Ok(self.receiver.try_recv()?)
    }

    /// Samples lost because this subscriber could not keep up
    pub fn overruns(&self) -> usize {
        self.receiver.overruns()
    }
}

pub fn validate_channel_name(name: &str) -> bool {
    name.len() > 1
        && name.starts_with('/')
        && !name.ends_with('/')
        && !name.contains("//")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/')
}

#[derive(Debug)]
struct TelemetryChannel {
    typename: &'static str,

    transport: Box<dyn Any + Send>, // TelemetryChannelTransport<T>
}

struct TelemetryChannelTransport<T> {
    channel: Weak<Channel<Timestamped<T>>>,
    sender: Option<Sender<Timestamped<T>>>,
}

impl TelemetryChannel {
    fn new<T: 'static + Send>() -> Self {
        let channel = Arc::new(Channel::<Timestamped<T>>::default());
        let sender = Channel::add_sender(&channel);

        let transport = TelemetryChannelTransport::<T> {
            channel: Arc::downgrade(&channel),
            sender: Some(sender),
        };

        Self {
            typename: type_name::<T>(),
            transport: Box::new(transport),
        }
    }

    fn take_producer<T: 'static>(&mut self) -> Result<TelemetrySender<T>, TelemetryError> {
        let transport = self.downcast_mut::<T>()?;

        Ok(TelemetrySender {
            sender: transport
                .sender
                .take()
                .ok_or(TelemetryError::AlreadyHasProducer)?,
        })
    }

    fn add_subscriber<T: 'static>(
        &mut self,
        capacity: Capacity,
    ) -> Result<TelemetryReceiver<T>, TelemetryError> {
        let transport = self.downcast_mut::<T>()?;

        let ch = Weak::upgrade(&transport.channel).ok_or(TelemetryError::ClosedChannel)?;

        Ok(TelemetryReceiver {
            receiver: Channel::add_receiver(capacity, &ch),
        })
    }

    fn downcast_mut<T: 'static>(
        &mut self,
    ) -> Result<&mut TelemetryChannelTransport<T>, TelemetryError> {
        self.transport
            .downcast_mut::<TelemetryChannelTransport<T>>()
            .ok_or(TelemetryError::WrongChannelType {
                requested: type_name::<T>().to_string(),
                expected: self.typename.to_string(),
            })
    }
}

/// Registry of named, typed telemetry channels.
///
/// Every channel has at most one producer handle (which can be cloned by its
/// owner) and any number of subscribers, each with its own queue.
#[derive(Debug, Default, Clone)]
pub struct TelemetryService {
    inner: Arc<Mutex<TelemetryServiceInner>>,
}

#[derive(Debug, Default)]
struct TelemetryServiceInner {
    channels: HashMap<String, TelemetryChannel>,
}

impl TelemetryServiceInner {
    fn get_channel<T: 'static + Send>(
        &mut self,
        channel_name: &str,
    ) -> Result<&mut TelemetryChannel, TelemetryError> {
        if !validate_channel_name(channel_name) {
            return Err(TelemetryError::InvalidChannelName(
                channel_name.to_string(),
            ));
        }

        Ok(self
            .channels
            .entry(channel_name.to_string())
            .or_insert_with(TelemetryChannel::new::<T>))
    }
}

pub trait TelemetryDispatcher {
    fn publish<T: 'static + Send>(
        &self,
        channel_name: &str,
    ) -> Result<TelemetrySender<T>, TelemetryError>;

    fn subscribe<T: 'static + Send>(
        &self,
        channel_name: &str,
        capacity: Capacity,
    ) -> Result<TelemetryReceiver<T>, TelemetryError>;
}

impl TelemetryDispatcher for TelemetryService {
    fn publish<T: 'static + Send>(
        &self,
        channel_name: &str,
    ) -> Result<TelemetrySender<T>, TelemetryError> {
        let mut inner = self.inner.lock().unwrap();

        inner.get_channel::<T>(channel_name)?.take_producer()
    }

    fn subscribe<T: 'static + Send>(
        &self,
        channel_name: &str,
        capacity: Capacity,
    ) -> Result<TelemetryReceiver<T>, TelemetryError> {
        let mut inner = self.inner.lock().unwrap();

        inner.get_channel::<T>(channel_name)?.add_subscriber(capacity)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, Utc};

    use crate::core::time::SimulatedClock;

    use super::*;

    fn now() -> Timestamp {
        Timestamp::now(&SimulatedClock::new(
            DateTime::<Utc>::UNIX_EPOCH,
            TimeDelta::zero(),
        ))
    }

    #[test]
    fn test_empty_chan() -> Result<(), TelemetryError> {
        let ts = TelemetryService::default();

        let sub = ts.subscribe::<f64>("/drone/telemetry", 1usize.into())?;
        assert_eq!(sub.try_recv(), Err(TelemetryError::EmptyChannel));

        Ok(())
    }

    #[test]
    fn test_single_producer() -> Result<(), TelemetryError> {
        let ts = TelemetryService::default();

        let _prod = ts.publish::<f64>("/rig/command")?;
        assert_eq!(
            ts.publish::<f64>("/rig/command").err(),
            Some(TelemetryError::AlreadyHasProducer)
        );

        Ok(())
    }

    #[test]
    fn test_pub_sub_fan_out() -> Result<(), TelemetryError> {
        let ts = TelemetryService::default();

        let sub1 = ts.subscribe::<u32>("/rig/telemetry", 4usize.into())?;
        let sub2 = ts.subscribe::<u32>("/rig/telemetry", 4usize.into())?;
        let prod = ts.publish::<u32>("/rig/telemetry")?;

        let t = now();
        prod.send(t, 7);

        assert_eq!(sub1.try_recv(), Ok(Timestamped(t, 7)));
        assert_eq!(sub2.try_recv(), Ok(Timestamped(t, 7)));
        assert_eq!(sub1.try_recv(), Err(TelemetryError::EmptyChannel));

        Ok(())
    }

    #[test]
    fn test_slow_subscriber_does_not_block() -> Result<(), TelemetryError> {
        let ts = TelemetryService::default();

        let slow = ts.subscribe::<u32>("/drone/telemetry", 2usize.into())?;
        let prod = ts.publish::<u32>("/drone/telemetry")?;

        let t = now();
        for i in 0..10 {
            prod.send(t, i);
        }

        assert_eq!(slow.overruns(), 8);
        assert_eq!(slow.try_recv()?.1, 8);
        assert_eq!(slow.try_recv()?.1, 9);

        Ok(())
    }

    #[test]
    fn test_closed_when_producer_dropped() -> Result<(), TelemetryError> {
        let ts = TelemetryService::default();

        let sub = ts.subscribe::<u32>("/rig/telemetry", 4usize.into())?;
        let prod = ts.publish::<u32>("/rig/telemetry")?;
        let prod2 = prod.clone();

        prod.send(now(), 1);
        drop(prod);
        prod2.send(now(), 2);
        drop(prod2);

        assert_eq!(sub.recv()?.1, 1);
        assert_eq!(sub.recv()?.1, 2);
        assert_eq!(sub.recv(), Err(TelemetryError::ClosedChannel));

        Ok(())
    }

    #[test]
    fn test_bad_channel_type() -> Result<(), TelemetryError> {
        let ts = TelemetryService::default();

        ts.subscribe::<f64>("/test/channel", 1usize.into())?;

        assert_eq!(
            ts.publish::<f32>("/test/channel").err(),
            Some(TelemetryError::WrongChannelType {
                requested: type_name::<f32>().to_string(),
                expected: type_name::<f64>().to_string()
            })
        );

        Ok(())
    }

    #[test]
    fn test_channel_names() {
        assert!(validate_channel_name("/drone/telemetry"));
        assert!(validate_channel_name("/rig_1/command"));
        assert!(!validate_channel_name("drone"));
        assert!(!validate_channel_name("/"));
        assert!(!validate_channel_name("/drone/"));
        assert!(!validate_channel_name("/drone//x"));
        assert!(!validate_channel_name("/drone telemetry"));

        let ts = TelemetryService::default();
        assert_eq!(
            ts.publish::<u8>("bad name").err(),
            Some(TelemetryError::InvalidChannelName("bad name".to_string()))
        );
    }
}
