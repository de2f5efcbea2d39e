//! RFCOMM serial links.
//!
//! A link owns the write half of a stream and a receive task that appends
//! everything arriving on the read half to a shared buffer. Reads take one
//! delimiter-terminated message out of that buffer. The buffer is bounded;
//! once full, the oldest bytes are dropped.

use std::{
   sync::{
      Arc,
      atomic::{AtomicBool, Ordering},
   },
   time::Duration,
};

use bluer::{
   Address,
   rfcomm::{SocketAddr, Stream},
};
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::{
   io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
   sync::Mutex as AsyncMutex,
   task::JoinHandle,
   time,
};

use crate::error::{GateError, Result};

/// Timeout for connection attempts
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for write operations
const WRITE_TIMEOUT: Duration = Duration::from_secs(25);
/// Size of a single socket read
const READ_CHUNK: usize = 1024;

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Default)]
struct Inbox {
   data: Mutex<Vec<u8>>,
   closed: AtomicBool,
}

impl Inbox {
   /// Appends `bytes`, trimming from the front to stay within `max_buffer`.
   /// Returns the number of bytes dropped.
   fn push(&self, bytes: &[u8], max_buffer: usize) -> usize {
      let mut data = self.data.lock();
      data.extend_from_slice(bytes);
      let excess = data.len().saturating_sub(max_buffer);
      data.drain(..excess);
      excess
   }
}

/// An open serial link to one device.
pub struct RfcommLink {
   writer: AsyncMutex<Writer>,
   inbox: Arc<Inbox>,
   reader: JoinHandle<()>,
   delimiter: u8,
}

/// Framing and buffering parameters of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
   pub delimiter: u8,
   pub max_buffer: usize,
}

impl RfcommLink {
   /// Opens an RFCOMM connection to `address` on `channel`.
   pub async fn open(address: Address, channel: u8, options: LinkOptions) -> Result<Self> {
      let target = SocketAddr::new(address, channel);
      let stream = time::timeout(CONNECT_TIMEOUT, Stream::connect(target))
         .await
         .map_err(|_| GateError::binding(format!("connecting to {address} timed out")))??;
      debug!("RFCOMM link to {address} open on channel {channel}");

      let (read_half, write_half) = stream.into_split();
      Ok(Self::from_halves(read_half, write_half, options))
   }

   /// Builds a link over any split byte stream.
   pub fn from_halves<R, W>(read_half: R, write_half: W, options: LinkOptions) -> Self
   where
      R: AsyncRead + Send + Unpin + 'static,
      W: AsyncWrite + Send + Unpin + 'static,
   {
      let inbox = Arc::new(Inbox::default());
      let reader = tokio::spawn(receive_loop(read_half, inbox.clone(), options.max_buffer));
      Self {
         writer: AsyncMutex::new(Box::new(write_half)),
         inbox,
         reader,
         delimiter: options.delimiter,
      }
   }

   pub fn is_open(&self) -> bool {
      !self.inbox.closed.load(Ordering::Acquire)
   }

   pub async fn write(&self, data: &[u8]) -> Result<()> {
      if !self.is_open() {
         return Err(GateError::NoDeviceConnected);
      }

      let mut writer = self.writer.lock().await;
      time::timeout(WRITE_TIMEOUT, async {
         writer.write_all(data).await?;
         writer.flush().await
      })
      .await
      .map_err(|_| GateError::binding("write timed out"))??;
      Ok(())
   }

   /// Takes the next delimiter-terminated message, delimiter included.
   pub fn read(&self) -> Option<Vec<u8>> {
      let mut data = self.inbox.data.lock();
      let end = data.iter().position(|b| *b == self.delimiter)?;
      Some(data.drain(..=end).collect())
   }

   pub fn available(&self) -> usize {
      self.inbox.data.lock().len()
   }

   pub fn clear(&self) {
      self.inbox.data.lock().clear();
   }
}

impl Drop for RfcommLink {
   fn drop(&mut self) {
      self.reader.abort();
   }
}

async fn receive_loop<R>(mut read_half: R, inbox: Arc<Inbox>, max_buffer: usize)
where
   R: AsyncRead + Unpin,
{
   let mut chunk = [0u8; READ_CHUNK];
   let mut overflowing = false;
   loop {
      match read_half.read(&mut chunk).await {
         Ok(0) => {
            debug!("RFCOMM link closed by peer");
            break;
         },
         Ok(n) => {
            let dropped = inbox.push(&chunk[..n], max_buffer);
            if dropped > 0 && !overflowing {
               warn!("RFCOMM receive buffer full ({max_buffer} bytes), dropping oldest data");
            }
            overflowing = dropped > 0;
         },
         Err(e) => {
            warn!("RFCOMM receive failed: {e}");
            break;
         },
      }
   }
   inbox.closed.store(true, Ordering::Release);
}
