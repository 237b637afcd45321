//! The engine's storage ABI, forwarded to the flash backend.
//!
//! Writes and erases pass through the fault injector first; reads, sector
//! queries and checksums never do.

use crc::{CRC_16_XMODEM, Crc};

use crate::error::{FsError, FsResult};
use crate::fault::{FaultInjector, FaultState};
use crate::flash::Flash;

const CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC-16/CCITT over `data`, continuing from `initial`.
///
/// Chaining works by passing the previous result as `initial`.
pub fn crc16_ccitt(initial: u16, data: &[u8]) -> u16 {
    let mut digest = CCITT.digest_with_initial(initial);
    digest.update(data);
    digest.finalize()
}

/// Flash access handed to the engine for one invocation.
///
/// The `id` argument of every call names the flash device; the harness
/// simulates exactly one and ignores it.
pub struct FlashBridge<'a> {
    dev: &'a mut dyn Flash,
    faults: &'a mut FaultInjector,
}

impl<'a> FlashBridge<'a> {
    pub(crate) fn new(dev: &'a mut dyn Flash, faults: &'a mut FaultInjector) -> Self {
        Self { dev, faults }
    }

    pub fn read(&mut self, id: u8, address: u32, buf: &mut [u8]) -> FsResult<()> {
        log::debug!("flash read: id={id}, address={address:x}, num_bytes={}", buf.len());
        self.dev
            .read(address as usize, buf)
            .map_err(|e| hardware("read", e))
    }

    pub fn write(&mut self, id: u8, address: u32, data: &[u8]) -> FsResult<()> {
        log::debug!("flash write: id={id}, address={address:x}, num_bytes={:x}", data.len());
        self.faults.tick()?;
        self.dev
            .write(address as usize, data)
            .map_err(|e| hardware("write", e))
    }

    /// # Panics
    ///
    /// Panics when the backend refuses the erase: the engine only erases
    /// whole areas, so a refusal means the harness was set up wrong.
    pub fn erase(&mut self, id: u8, address: u32, num_bytes: u32) -> FsResult<()> {
        log::debug!("flash erase: id={id}, address={address:x}, num_bytes={num_bytes}");
        self.faults.tick()?;
        if let Err(e) = self.dev.erase(address as usize, num_bytes as usize) {
            log::error!("flash erase: address={address:x}, num_bytes={num_bytes}: {e}");
            panic!("flash erase at 0x{address:x}+0x{num_bytes:x} failed: {e}");
        }
        Ok(())
    }

    /// Base address and size of `sector`.
    pub fn info(&mut self, id: u8, sector: u32) -> FsResult<(u32, u32)> {
        log::debug!("flash info: id={id}, sector={sector:x}");
        let (base, size) = self
            .dev
            .info(sector as usize)
            .map_err(|e| hardware("info", e))?;
        Ok((base as u32, size as u32))
    }

    pub fn crc16(&self, initial: u16, data: &[u8]) -> u16 {
        log::debug!("crc16: initial={initial:x}, len={}", data.len());
        crc16_ccitt(initial, data)
    }

    pub fn align(&self) -> usize {
        self.dev.align()
    }

    pub fn erased_val(&self) -> u8 {
        self.dev.erased_val()
    }

    /// Whether power was cut earlier in this invocation.
    pub(crate) fn powered_down(&self) -> bool {
        self.faults.state() == FaultState::Fired
    }
}

fn hardware(op: &str, err: crate::error::FlashError) -> FsError {
    log::warn!("flash {op}: {err}");
    FsError::Hardware(err.to_string())
}
