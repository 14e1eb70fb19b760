//! A communication channel used to send/receive messages to/from other parties.

use std::{fmt, future::Future, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::mpsc::{Receiver, Sender, channel},
    time::timeout,
};
use tracing::trace;

use crate::config::DEFAULT_ROUND_TIMEOUT;

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug, thiserror::Error)]
#[error("channel error while {phase}: {reason:?}")]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    SendError(String),
    /// The message could not be (de-)serialized.
    SerdeError(String),
    /// The message is a Vec, but not of the expected length.
    InvalidLength {
        /// The expected number of elements.
        expected: usize,
        /// The number of elements received.
        actual: usize,
    },
}

/// A communication channel used to send/receive messages to/from another party.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index (must be between `0..participants`).
    fn send_bytes_to(
        &mut self,
        party: usize,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a response from the party with the given index (must be between `0..participants`).
    fn recv_bytes_from(
        &mut self,
        party: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// Serializes and sends a message to the other party.
pub(crate) async fn send_to<S: Serialize + ?Sized>(
    channel: &mut impl Channel,
    party: usize,
    phase: &str,
    msg: &S,
) -> Result<(), Error> {
    let msg = bincode::serialize(msg).map_err(|e| Error {
        phase: format!("sending {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })?;
    channel.send_bytes_to(party, msg).await.map_err(|e| Error {
        phase: format!("sending {phase}"),
        reason: ErrorKind::SendError(format!("{e:?}")),
    })
}

/// Receives and deserializes a message from the other party.
pub(crate) async fn recv_from<T: DeserializeOwned>(
    channel: &mut impl Channel,
    party: usize,
    phase: &str,
) -> Result<T, Error> {
    let msg = channel.recv_bytes_from(party).await.map_err(|e| Error {
        phase: format!("receiving {phase}"),
        reason: ErrorKind::RecvError(format!("{e:?}")),
    })?;
    bincode::deserialize(&msg).map_err(|e| Error {
        phase: format!("receiving {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })
}

/// Receives and deserializes a Vec from the other party (while checking the length).
pub(crate) async fn recv_vec_from<T: DeserializeOwned>(
    channel: &mut impl Channel,
    party: usize,
    phase: &str,
    len: usize,
) -> Result<Vec<T>, Error> {
    let v: Vec<T> = recv_from(channel, party, phase).await?;
    if v.len() == len {
        Ok(v)
    } else {
        Err(Error {
            phase: format!("receiving {phase}"),
            reason: ErrorKind::InvalidLength {
                expected: len,
                actual: v.len(),
            },
        })
    }
}

/// A simple in-process channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Option<Sender<Vec<u8>>>>,
    r: Vec<Option<Receiver<Vec<u8>>>>,
    recv_timeout: Duration,
}

impl SimpleChannel {
    /// Creates channels for N participants to communicate with each other.
    pub fn channels(participants: usize) -> Vec<Self> {
        Self::channels_with_timeout(participants, DEFAULT_ROUND_TIMEOUT)
    }

    /// Creates channels whose receivers give up after `recv_timeout`.
    pub fn channels_with_timeout(participants: usize, recv_timeout: Duration) -> Vec<Self> {
        let buffer_capacity = 1024;
        let mut channels: Vec<Self> = (0..participants)
            .map(|_| SimpleChannel {
                s: (0..participants).map(|_| None).collect(),
                r: (0..participants).map(|_| None).collect(),
                recv_timeout,
            })
            .collect();
        for a in 0..participants {
            for b in (a + 1)..participants {
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
                channels[a].s[b] = Some(send_a_to_b);
                channels[b].s[a] = Some(send_b_to_a);
                channels[a].r[b] = Some(recv_b_to_a);
                channels[b].r[a] = Some(recv_a_to_b);
            }
        }
        channels
    }
}

/// The error raised by `send` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncSendError {
    /// There is no connection to the specified participant.
    NoSuchParty(usize),
    /// The receiving side has been dropped.
    Closed,
}

/// The error raised by `recv` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncRecvError {
    /// There is no connection to the specified participant.
    NoSuchParty(usize),
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
}

impl Channel for SimpleChannel {
    type SendError = AsyncSendError;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(&mut self, p: usize, msg: Vec<u8>) -> Result<(), AsyncSendError> {
        trace!("sending {} bytes to party {p}", msg.len());
        let sender = self
            .s
            .get(p)
            .and_then(Option::as_ref)
            .ok_or(AsyncSendError::NoSuchParty(p))?;
        sender.send(msg).await.map_err(|_| AsyncSendError::Closed)
    }

    async fn recv_bytes_from(&mut self, p: usize) -> Result<Vec<u8>, AsyncRecvError> {
        let recv_timeout = self.recv_timeout;
        let receiver = self
            .r
            .get_mut(p)
            .and_then(Option::as_mut)
            .ok_or(AsyncRecvError::NoSuchParty(p))?;
        match timeout(recv_timeout, receiver.recv()).await {
            Ok(Some(bytes)) => {
                trace!("received {} bytes from party {p}", bytes.len());
                Ok(bytes)
            }
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive_between_parties() -> Result<(), Error> {
        let [mut a, mut b, mut c]: [SimpleChannel; 3] = SimpleChannel::channels(3)
            .try_into()
            .expect("3 participants");
        send_to(&mut a, 2, "greeting", &vec![1u64, 2, 3]).await?;
        send_to(&mut b, 2, "greeting", &vec![4u64]).await?;
        let from_a: Vec<u64> = recv_vec_from(&mut c, 0, "greeting", 3).await?;
        let from_b = recv_vec_from::<u64>(&mut c, 1, "greeting", 2).await;
        assert_eq!(from_a, vec![1, 2, 3]);
        assert!(matches!(
            from_b,
            Err(Error {
                reason: ErrorKind::InvalidLength {
                    expected: 2,
                    actual: 1
                },
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn receiving_times_out() {
        let [mut a, _b]: [SimpleChannel; 2] =
            SimpleChannel::channels_with_timeout(2, Duration::from_millis(10))
                .try_into()
                .expect("2 participants");
        let result = recv_from::<u64>(&mut a, 1, "nothing").await;
        assert!(matches!(
            result,
            Err(Error {
                reason: ErrorKind::RecvError(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unknown_party() {
        let mut channels = SimpleChannel::channels(2);
        let result = send_to(&mut channels[0], 5, "nowhere", &()).await;
        assert!(matches!(
            result,
            Err(Error {
                reason: ErrorKind::SendError(_),
                ..
            })
        ));
    }
}
