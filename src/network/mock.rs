//! Simulated kettle for tests
//!
//! Speaks the variant 4 command set over an in-memory link and can be told to
//! misbehave: refuse connections, reject auth, swallow responses or answer
//! with stale sequence numbers.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::core::{Error, Result};
use crate::protocol::codec;
use crate::protocol::message::BLOCK_LEN;
use super::{Link, Transport, RX_CHARACTERISTIC, TX_CHARACTERISTIC};

#[derive(Debug)]
struct Device {
    mode: u8,
    target_temp: u8,
    current_temp: u8,
    is_on: bool,
    boil_time: u8,
    auth_status: u8,
    failing_connects: u32,
    silent: bool,
    stale_first: bool,
    stale_only: bool,
    link_up: bool,
    connects: u32,
    last_address: Option<String>,
    sink: Option<mpsc::UnboundedSender<Bytes>>,
    log: Vec<u8>,
}

impl Device {
    fn respond(&mut self, command: u8, payload: &[u8]) -> Vec<u8> {
        match command {
            0xFF => vec![self.auth_status],
            0x01 => vec![2, 7],
            0x06 => {
                let mut data = vec![0u8; BLOCK_LEN];
                data[0] = self.mode;
                data[2] = self.target_temp;
                data[4] = 1;
                data[5] = self.current_temp;
                data[6] = 30;
                data[8] = u8::from(self.is_on);
                data[13] = self.boil_time;
                data
            }
            0x03 => {
                self.is_on = true;
                vec![1]
            }
            0x04 => {
                self.is_on = false;
                vec![1]
            }
            0x05 => {
                self.mode = payload[0];
                self.target_temp = payload[2];
                self.boil_time = payload[13];
                vec![1]
            }
            0x6F => {
                let mut data = 1_700_000_000i32.to_le_bytes().to_vec();
                data.extend_from_slice(&0i32.to_le_bytes());
                data
            }
            0x30 => 24u16.to_le_bytes().to_vec(),
            0x33 => {
                let mut data = vec![0u8; BLOCK_LEN];
                data[0] = payload[0];
                data[1] = 40;
                data[2] = 0x5E;
                data[5] = 255;
                data[6] = 65;
                data[7] = 0x5E;
                data[9] = 255;
                data[11] = 90;
                data[12] = 0x5E;
                data[13] = 255;
                data
            }
            0x35 => vec![payload[0], 0, 1, 0, 0],
            0x47 | 0x50 | 0x52 => vec![0u8; BLOCK_LEN],
            0x36 | 0x38 | 0x3C => vec![1],
            _ => vec![0],
        }
    }
}

/// Handle to a simulated kettle; clones share the same device
#[derive(Clone)]
pub(crate) struct MockKettle {
    device: Arc<Mutex<Device>>,
}

impl MockKettle {
    /// Kettle that is off in Boil mode with water at 20 °C
    pub fn new() -> Self {
        MockKettle {
            device: Arc::new(Mutex::new(Device {
                mode: 0,
                target_temp: 0,
                current_temp: 20,
                is_on: false,
                boil_time: 0x80,
                auth_status: 1,
                failing_connects: 0,
                silent: false,
                stale_first: false,
                stale_only: false,
                link_up: false,
                connects: 0,
                last_address: None,
                sink: None,
                log: Vec::new(),
            })),
        }
    }

    fn device(&self) -> MutexGuard<'_, Device> {
        self.device.lock().unwrap()
    }

    pub fn set_state(&self, mode: u8, target_temp: u8, is_on: bool) {
        let mut device = self.device();
        device.mode = mode;
        device.target_temp = target_temp;
        device.is_on = is_on;
    }

    pub fn is_on(&self) -> bool {
        self.device().is_on
    }

    pub fn fail_connects(&self, count: u32) {
        self.device().failing_connects = count;
    }

    pub fn reject_auth(&self) {
        self.device().auth_status = 0;
    }

    /// Stops answering commands while `silent` is set
    pub fn set_silent(&self, silent: bool) {
        self.device().silent = silent;
    }

    /// Precedes every answer with a copy carrying the previous sequence number
    pub fn send_stale_first(&self, stale: bool) {
        self.device().stale_first = stale;
    }

    /// Answers only with sequence numbers that belong to no pending command
    pub fn send_stale_only(&self, stale: bool) {
        self.device().stale_only = stale;
    }

    /// Simulates the link dropping without a disconnect call
    pub fn drop_link(&self) {
        self.device().link_up = false;
    }

    pub fn link_up(&self) -> bool {
        self.device().link_up
    }

    pub fn connects(&self) -> u32 {
        self.device().connects
    }

    /// Address of the most recent connect attempt
    pub fn last_address(&self) -> Option<String> {
        self.device().last_address.clone()
    }

    /// Opcodes received so far
    pub fn log(&self) -> Vec<u8> {
        self.device().log.clone()
    }

    pub fn clear_log(&self) {
        self.device().log.clear();
    }

    /// Opcodes received after the last post-auth clock sync
    pub fn commands_since_sync(&self) -> Vec<u8> {
        let log = self.log();
        match log.iter().rposition(|op| *op == 0x6E) {
            Some(i) => log[i + 1..].to_vec(),
            None => log,
        }
    }
}

#[async_trait]
impl Transport for MockKettle {
    async fn connect(
        &self,
        address: &str,
        _adapter: Option<&str>,
        _timeout: Duration,
    ) -> Result<Box<dyn Link>> {
        let mut device = self.device();
        device.connects += 1;
        device.last_address = Some(address.to_string());
        if device.failing_connects > 0 {
            device.failing_connects -= 1;
            return Err(Error::connect(format!("{address} not reachable")));
        }
        device.link_up = true;
        Ok(Box::new(MockLink {
            device: Arc::clone(&self.device),
        }))
    }
}

struct MockLink {
    device: Arc<Mutex<Device>>,
}

#[async_trait]
impl Link for MockLink {
    async fn write(&mut self, characteristic: &str, data: &[u8]) -> Result<()> {
        assert_eq!(characteristic, TX_CHARACTERISTIC);
        let frame = codec::decode(data)?;
        let mut device = self.device.lock().unwrap();
        if !device.link_up {
            return Err(Error::transport("link is down"));
        }
        device.log.push(frame.command);
        if device.silent {
            return Ok(());
        }

        let response = device.respond(frame.command, &frame.payload);
        if let Some(sink) = &device.sink {
            if device.stale_only {
                for k in 1..=3u8 {
                    let stale = frame.sequence.wrapping_add(k.wrapping_mul(7));
                    let _ = sink.send(codec::encode(stale, frame.command, &response));
                }
                return Ok(());
            }
            if device.stale_first {
                let stale = frame.sequence.wrapping_sub(1);
                let _ = sink.send(codec::encode(stale, frame.command, &[0xEE]));
            }
            let _ = sink.send(codec::encode(frame.sequence, frame.command, &response));
        }
        Ok(())
    }

    async fn subscribe(
        &mut self,
        characteristic: &str,
        sink: mpsc::UnboundedSender<Bytes>,
    ) -> Result<()> {
        assert_eq!(characteristic, RX_CHARACTERISTIC);
        self.device.lock().unwrap().sink = Some(sink);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.device.lock().unwrap().link_up
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut device = self.device.lock().unwrap();
        device.link_up = false;
        device.sink = None;
        Ok(())
    }
}
