//! Replication of file writes and primitive extraction across a cluster.
//!
//! The head replica performs the operation and broadcasts its outcome over a
//! [`MulticastPipe`]; followers read the outcome instead of repeating the work,
//! so every replica reports the same result.
use crate::error::ClusterError;
use crate::primitive::{read_primitive_from_pipe, write_primitive_to_pipe, Primitive};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crossbeam_channel::{Receiver, Sender};
use std::io::{self, Read, Write};

const TAG_OK: u8 = 0;
const TAG_FAILED: u8 = 1;

/// Byte stream from the head to every follower. Writes are delivered on `flush`.
pub trait MulticastPipe: Read + Write {}

impl<T: Read + Write> MulticastPipe for T {}

/// In-process pipe built on channels, one receiver per follower.
#[derive(Debug)]
pub struct ChannelPipe {
    senders: Vec<Sender<Vec<u8>>>,
    receiver: Option<Receiver<Vec<u8>>>,
    outgoing: Vec<u8>,
    incoming: Vec<u8>,
    read_pos: usize,
}

impl ChannelPipe {
    /// A head end and `followers` follower ends.
    pub fn group(followers: usize) -> (ChannelPipe, Vec<ChannelPipe>) {
        let mut senders = Vec::with_capacity(followers);
        let mut ends = Vec::with_capacity(followers);
        for _ in 0..followers {
            let (tx, rx) = crossbeam_channel::unbounded();
            senders.push(tx);
            ends.push(ChannelPipe::end(Vec::new(), Some(rx)));
        }
        (ChannelPipe::end(senders, None), ends)
    }

    fn end(senders: Vec<Sender<Vec<u8>>>, receiver: Option<Receiver<Vec<u8>>>) -> Self {
        Self {
            senders,
            receiver,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            read_pos: 0,
        }
    }
}

impl Write for ChannelPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outgoing.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.outgoing.is_empty() {
            return Ok(());
        }
        let message = std::mem::take(&mut self.outgoing);
        for sender in &self.senders {
            sender
                .send(message.clone())
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "follower disconnected"))?;
        }
        Ok(())
    }
}

impl Read for ChannelPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_pos >= self.incoming.len() {
            let Some(receiver) = &self.receiver else {
                return Ok(0);
            };
            match receiver.recv() {
                Ok(message) => {
                    self.incoming = message;
                    self.read_pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.incoming.len() - self.read_pos);
        buf[..n].copy_from_slice(&self.incoming[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        Ok(n)
    }
}

fn write_message<W: Write>(pipe: &mut W, message: &str) -> io::Result<()> {
    pipe.write_u32::<LittleEndian>(message.len() as u32)?;
    pipe.write_all(message.as_bytes())
}

fn read_message<R: Read>(pipe: &mut R) -> Result<String, ClusterError> {
    let len = pipe.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    pipe.read_exact(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_tag<R: Read>(pipe: &mut R) -> Result<u8, ClusterError> {
    pipe.read_u8().map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ClusterError::Disconnected,
        _ => ClusterError::Io(e),
    })
}

/// Broadcast the outcome of an operation and flush.
pub fn send_outcome<W: Write>(pipe: &mut W, outcome: &Result<(), String>) -> Result<(), ClusterError> {
    match outcome {
        Ok(()) => pipe.write_u8(TAG_OK)?,
        Err(message) => {
            pipe.write_u8(TAG_FAILED)?;
            write_message(pipe, message)?;
        }
    }
    pipe.flush()?;
    Ok(())
}

pub fn receive_outcome<R: Read>(pipe: &mut R) -> Result<(), ClusterError> {
    match read_tag(pipe)? {
        TAG_OK => Ok(()),
        TAG_FAILED => Err(ClusterError::RemoteFailure(read_message(pipe)?)),
        tag => Err(ClusterError::Divergence(tag)),
    }
}

/// Broadcast an extracted primitive, or the reason extraction failed, and flush.
pub fn send_primitive<W: Write>(pipe: &mut W, outcome: Result<&Primitive, &str>) -> Result<(), ClusterError> {
    match outcome {
        Ok(primitive) => {
            pipe.write_u8(TAG_OK)?;
            write_primitive_to_pipe(pipe, primitive)?;
        }
        Err(message) => {
            pipe.write_u8(TAG_FAILED)?;
            write_message(pipe, message)?;
        }
    }
    pipe.flush()?;
    Ok(())
}

pub fn receive_primitive<R: Read>(pipe: &mut R) -> Result<Primitive, ClusterError> {
    match read_tag(pipe)? {
        TAG_OK => Ok(read_primitive_from_pipe(pipe)?),
        TAG_FAILED => Err(ClusterError::RemoteFailure(read_message(pipe)?)),
        tag => Err(ClusterError::Divergence(tag)),
    }
}

/// Role of this process in a replicated session.
pub enum Replica<P> {
    /// No cluster: operations run locally.
    Standalone,
    Head(P),
    Follower(P),
}

impl<P: MulticastPipe> Replica<P> {
    /// Whether this replica performs file writes and extractions itself.
    pub fn is_head(&self) -> bool {
        !matches!(self, Replica::Follower(_))
    }

    /// Run `op` on the head and share its outcome; followers only receive it.
    ///
    /// A failure comes back as [`ClusterError::RemoteFailure`] with the same message on every replica.
    pub fn run<F>(&mut self, op: F) -> Result<(), ClusterError>
    where
        F: FnOnce() -> Result<(), String>,
    {
        match self {
            Replica::Standalone => op().map_err(ClusterError::RemoteFailure),
            Replica::Head(pipe) => {
                let outcome = op();
                send_outcome(pipe, &outcome)?;
                outcome.map_err(ClusterError::RemoteFailure)
            }
            Replica::Follower(pipe) => receive_outcome(pipe),
        }
    }

    /// Produce a primitive on the head and replicate it to the followers.
    pub fn share_primitive<F>(&mut self, produce: F) -> Result<Primitive, ClusterError>
    where
        F: FnOnce() -> Result<Primitive, String>,
    {
        match self {
            Replica::Standalone => produce().map_err(ClusterError::RemoteFailure),
            Replica::Head(pipe) => {
                let outcome = produce();
                send_primitive(pipe, outcome.as_ref().map_err(String::as_str))?;
                outcome.map_err(ClusterError::RemoteFailure)
            }
            Replica::Follower(pipe) => receive_primitive(pipe),
        }
    }
}
