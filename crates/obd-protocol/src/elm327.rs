//! ELM327 link driver
//!
//! Talks the ELM327 text protocol over a serial port: commands are terminated
//! with `\r` and every answer ends with the `>` prompt.

use crate::error::ObdError;
use crate::link::LinkDriver;
use crate::mode;
use crate::pid::{Pid, PidResponse};
use crate::protocol::ObdProtocol;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Default timeout for OBD commands
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Supported-PID bitmaps are published in 32-PID pages
const PAGE_SIZE: u8 = 0x20;

/// Byte stream an adapter is reachable through
pub trait AdapterPort: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AdapterPort for T {}

/// Link driver for ELM327-compatible adapters
pub struct Elm327 {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    device: String,
    /// Serial baud rate
    baud_rate: u32,
    /// Bus protocol requested at init
    protocol: ObdProtocol,
    /// Command timeout
    timeout: Duration,
    /// Open port, if any
    port: Option<Box<dyn AdapterPort>>,
    /// Whether the last `initialize` succeeded
    initialized: bool,
    /// PID of the query awaiting its answer
    pending: Option<Pid>,
    /// Supported-PID bitmaps keyed by page base, cleared on every init
    supported: HashMap<u8, u32>,
}

impl Elm327 {
    /// Create a driver for the adapter at `device`; the port is opened on `initialize`
    pub fn new(device: &str, baud_rate: u32) -> Self {
        info!("Creating ELM327 driver for device: {}", device);
        Self {
            device: device.to_string(),
            baud_rate,
            protocol: ObdProtocol::Auto,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            port: None,
            initialized: false,
            pending: None,
            supported: HashMap::new(),
        }
    }

    /// Create a driver over an already open stream
    pub fn with_port(port: Box<dyn AdapterPort>) -> Self {
        let mut driver = Self::new("attached", 0);
        driver.port = Some(port);
        driver
    }

    /// Set the bus protocol requested at init
    pub fn set_protocol(&mut self, protocol: ObdProtocol) {
        self.protocol = protocol;
    }

    /// Set command timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Get current protocol
    pub fn protocol(&self) -> ObdProtocol {
        self.protocol
    }

    /// Check if the adapter finished initialization
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn open_port(&mut self) -> Result<(), ObdError> {
        if self.port.is_none() {
            info!("Opening serial port {} at {} baud", self.device, self.baud_rate);
            let port = tokio_serial::new(&self.device, self.baud_rate).open_native_async()?;
            self.port = Some(Box::new(port));
        }
        Ok(())
    }

    async fn write_command(&mut self, cmd: &str) -> Result<(), ObdError> {
        let port = self.port.as_mut().ok_or(ObdError::AdapterNotResponding)?;
        debug!("ELM327 <- {}", cmd);
        let written = async {
            port.write_all(cmd.as_bytes()).await?;
            port.write_all(b"\r").await?;
            port.flush().await
        }
        .await;
        if let Err(e) = written {
            self.drop_port();
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_response(&mut self) -> Result<String, ObdError> {
        let port = self.port.as_mut().ok_or(ObdError::AdapterNotResponding)?;
        match tokio::time::timeout(self.timeout, read_until_prompt(port)).await {
            Err(_) => Err(ObdError::Timeout(self.timeout.as_millis() as u64)),
            Ok(Err(e)) => {
                self.drop_port();
                Err(e.into())
            }
            Ok(Ok(text)) => {
                debug!("ELM327 -> {:?}", text);
                Ok(text)
            }
        }
    }

    async fn command(&mut self, cmd: &str) -> Result<String, ObdError> {
        self.write_command(cmd).await?;
        self.read_response().await
    }

    async fn expect_ok(&mut self, cmd: &str) -> Result<(), ObdError> {
        let text = self.command(cmd).await?;
        if text.to_ascii_uppercase().contains("OK") {
            Ok(())
        } else {
            Err(ObdError::CommandRejected(cmd.to_string()))
        }
    }

    fn drop_port(&mut self) {
        warn!("Dropping serial port {} after IO error", self.device);
        self.port = None;
        self.initialized = false;
        self.pending = None;
    }

    /// Fetch (or recall) the supported-PID bitmap for the page starting at `base`
    async fn supported_page(&mut self, base: u8) -> Result<u32, ObdError> {
        if let Some(bits) = self.supported.get(&base) {
            return Ok(*bits);
        }
        let bits = match self.command(&format!("{:02X}{:02X}", mode::CURRENT_DATA, base)).await {
            Ok(text) => parse_bitmap(&text, base)?,
            Err(e) if e.is_unsupported() => 0,
            Err(e) => return Err(e),
        };
        self.supported.insert(base, bits);
        Ok(bits)
    }
}

#[async_trait]
impl LinkDriver for Elm327 {
    async fn initialize(&mut self) -> Result<(), ObdError> {
        self.initialized = false;
        self.pending = None;
        self.supported.clear();
        self.open_port()?;

        info!("Initializing ELM327 adapter on {}", self.device);
        let banner = self.command("ATZ").await?;
        debug!("Adapter reset: {}", banner.trim());
        self.expect_ok("ATE0").await?;
        self.expect_ok("ATL0").await?;
        let select = self.protocol.to_elm_command();
        self.expect_ok(&select).await?;

        // The first supported-PIDs query both proves the bus is up and seeds the cache
        let text = self.command("0100").await?;
        let bits = parse_bitmap(&text, 0x00)?;
        self.supported.insert(0x00, bits);

        self.initialized = true;
        info!("ELM327 adapter initialized ({:?})", self.protocol);
        Ok(())
    }

    async fn send_query(&mut self, pid: Pid) -> Result<(), ObdError> {
        if !self.initialized {
            return Err(ObdError::NotInitialized);
        }
        self.write_command(&format!("{:02X}{:02X}", mode::CURRENT_DATA, pid.as_hex()))
            .await?;
        self.pending = Some(pid);
        Ok(())
    }

    async fn try_receive(&mut self) -> Result<PidResponse, ObdError> {
        let requested = self.pending.take().ok_or(ObdError::NoPendingQuery)?;
        let text = self.read_response().await?;
        let (answered, data) = parse_response(&text, requested.as_hex())?;
        let pid = Pid::try_from(answered)?;
        PidResponse::decode(pid, data)
    }

    async fn is_supported(&mut self, pid: Pid) -> Result<bool, ObdError> {
        if !self.initialized {
            return Err(ObdError::NotInitialized);
        }
        let target = pid.as_hex();
        let target_base = (target - 1) / PAGE_SIZE * PAGE_SIZE;
        let mut base = 0u8;
        loop {
            let bits = self.supported_page(base).await?;
            if base == target_base {
                return Ok(page_has(bits, base, target));
            }
            // The last bit of a page advertises the next page
            if !page_has(bits, base, base + PAGE_SIZE) {
                return Ok(false);
            }
            base += PAGE_SIZE;
        }
    }
}

async fn read_until_prompt<R: AsyncRead + Unpin + ?Sized>(port: &mut R) -> std::io::Result<String> {
    let mut buf = Vec::with_capacity(64);
    let mut chunk = [0u8; 64];
    loop {
        let n = port.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(prompt) = buf.iter().position(|&b| b == b'>') {
            buf.truncate(prompt);
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
    }
}

/// Extract `(answered pid, data bytes)` from a Mode 01 answer
pub(crate) fn parse_response(text: &str, requested: u8) -> Result<(u8, Vec<u8>), ObdError> {
    let reply = mode::CURRENT_DATA | 0x40;
    for line in text.split(['\r', '\n']).map(str::trim).filter(|l| !l.is_empty()) {
        let upper = line.to_ascii_uppercase();
        if upper.starts_with("SEARCHING") {
            continue;
        }
        if upper.contains("NO DATA") {
            return Err(ObdError::NoData(requested));
        }
        if upper.contains("UNABLE TO CONNECT") || (upper.contains("BUS INIT") && upper.contains("ERROR")) {
            return Err(ObdError::VehicleNotConnected);
        }
        if upper.contains("CAN ERROR") || upper.contains("BUS ERROR") {
            return Err(ObdError::CanBusError(line.to_string()));
        }
        if upper.contains("STOPPED") {
            return Err(ObdError::AdapterNotResponding);
        }
        if upper == "?" {
            return Err(ObdError::CommandRejected(format!("{:02X}", requested)));
        }
        if let Some(bytes) = parse_hex_line(&upper) {
            if bytes.len() >= 2 && bytes[0] == reply {
                return Ok((bytes[1], bytes[2..].to_vec()));
            }
        }
    }
    Err(ObdError::InvalidResponse(text.trim().to_string()))
}

fn parse_hex_line(line: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = line.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| std::str::from_utf8(pair).ok().and_then(|hex| u8::from_str_radix(hex, 16).ok()))
        .collect()
}

fn parse_bitmap(text: &str, base: u8) -> Result<u32, ObdError> {
    let (answered, data) = parse_response(text, base)?;
    if answered != base || data.len() < 4 {
        return Err(ObdError::InvalidResponse(text.trim().to_string()));
    }
    Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

/// Bit 31 of a page bitmap is PID `base + 1`, bit 0 is `base + 0x20`
fn page_has(bits: u32, base: u8, pid: u8) -> bool {
    if pid <= base || pid > base.saturating_add(PAGE_SIZE) {
        return false;
    }
    let offset = u32::from(pid - base - 1);
    (bits >> (31 - offset)) & 1 == 1
}
