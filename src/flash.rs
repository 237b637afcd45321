//! Flash media backend: the device trait, an in-memory simulator and the
//! area descriptors that carve a device into filesystem areas.

use std::fmt;
use std::path::Path;

use crate::error::FlashError;

/// One erase unit of a flash device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sector {
    pub num: usize,
    pub base: usize,
    pub size: usize,
}

/// Raw flash access, as a board support package would provide it.
pub trait Flash {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Program `data` at `offset`. The target bytes must be erased.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), FlashError>;

    /// Erase whole sectors covering `offset..offset + len`.
    fn erase(&mut self, offset: usize, len: usize) -> Result<(), FlashError>;

    /// Base address and size of sector `sector`.
    fn info(&self, sector: usize) -> Result<(usize, usize), FlashError>;

    fn sectors(&self) -> Vec<Sector>;

    /// Write alignment in bytes.
    fn align(&self) -> usize;

    /// Value read back from erased flash.
    fn erased_val(&self) -> u8;
}

/// An in-memory NOR-style flash device.
///
/// Every byte can be programmed once between erases; a second write to the
/// same byte is rejected the way real hardware would corrupt it.
#[derive(Debug, Clone)]
pub struct SimFlash {
    data: Vec<u8>,
    programmed: Vec<bool>,
    sectors: Vec<usize>,
    align: usize,
    erased_val: u8,
}

impl SimFlash {
    /// Build a device from a list of sector sizes, fully erased.
    pub fn new(sectors: Vec<usize>, align: usize, erased_val: u8) -> Result<SimFlash, FlashError> {
        if !matches!(align, 1 | 2 | 4 | 8) {
            return Err(FlashError::BadAlign(align));
        }
        let total = sectors.iter().sum();
        Ok(SimFlash {
            data: vec![erased_val; total],
            programmed: vec![false; total],
            sectors,
            align,
            erased_val,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw device contents.
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Write the raw image to `path` for offline inspection.
    pub fn dump(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, &self.data)
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<(), FlashError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(FlashError::OutOfBounds { offset, len }),
        }
    }
}

impl Flash for SimFlash {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError> {
        self.check_bounds(offset, buf.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), FlashError> {
        let len = data.len();
        self.check_bounds(offset, len)?;
        if offset % self.align != 0 || len % self.align != 0 {
            return Err(FlashError::Misaligned {
                offset,
                len,
                align: self.align,
            });
        }
        if let Some(pos) = self.programmed[offset..offset + len].iter().position(|&p| p) {
            return Err(FlashError::NotErased { offset: offset + pos });
        }
        self.data[offset..offset + len].copy_from_slice(data);
        self.programmed[offset..offset + len].fill(true);
        Ok(())
    }

    fn erase(&mut self, offset: usize, len: usize) -> Result<(), FlashError> {
        self.check_bounds(offset, len)?;
        let end = offset + len;
        let mut start_ok = false;
        let mut end_ok = false;
        let mut base = 0;
        for &size in &self.sectors {
            start_ok |= base == offset;
            end_ok |= base + size == end;
            base += size;
        }
        if !start_ok || !end_ok {
            return Err(FlashError::PartialSector { offset, len });
        }
        self.data[offset..end].fill(self.erased_val);
        self.programmed[offset..end].fill(false);
        Ok(())
    }

    fn info(&self, sector: usize) -> Result<(usize, usize), FlashError> {
        let size = *self.sectors.get(sector).ok_or(FlashError::NoSuchSector(sector))?;
        let base = self.sectors[..sector].iter().sum();
        Ok((base, size))
    }

    fn sectors(&self) -> Vec<Sector> {
        let mut base = 0;
        self.sectors
            .iter()
            .enumerate()
            .map(|(num, &size)| {
                let sector = Sector { num, base, size };
                base += size;
                sector
            })
            .collect()
    }

    fn align(&self) -> usize {
        self.align
    }

    fn erased_val(&self) -> u8 {
        self.erased_val
    }
}

/// One filesystem area: a sector-aligned span of a flash device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaDesc {
    pub offset: u32,
    pub length: u32,
    pub flash_id: u8,
}

/// The areas a filesystem is allowed to use on one device.
#[derive(Debug, Clone)]
pub struct AreaDescs {
    areas: Vec<AreaDesc>,
    sectors: Vec<Sector>,
}

impl AreaDescs {
    /// The embedded API passes areas in a zero-terminated 16 entry array.
    pub const MAX_AREAS: usize = 15;

    pub fn new(flash: &dyn Flash) -> AreaDescs {
        AreaDescs {
            areas: Vec::new(),
            sectors: flash.sectors(),
        }
    }

    /// Append an area; it must start on a sector boundary and stay on the device.
    pub fn add(&mut self, base: usize, len: usize) -> Result<(), FlashError> {
        if self.areas.len() >= Self::MAX_AREAS {
            return Err(FlashError::TooManyAreas(Self::MAX_AREAS));
        }

        let mut sbase = base;
        let mut slen = len;
        for sector in &self.sectors {
            if slen == 0 {
                break;
            }
            if sbase >= sector.base + sector.size {
                continue;
            }
            if sector.base != sbase {
                return Err(FlashError::AreaUnaligned { base, len });
            }
            sbase += sector.size;
            slen = slen.saturating_sub(sector.size);
        }
        if slen != 0 {
            return Err(FlashError::AreaPastEnd { base, len });
        }

        self.areas.push(AreaDesc {
            offset: base as u32,
            length: len as u32,
            flash_id: 0,
        });
        Ok(())
    }

    pub fn as_slice(&self) -> &[AreaDesc] {
        &self.areas
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

/// Named device geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceName {
    /// 1 MiB of uniform 4 KiB sectors, twelve areas.
    Linear4k,
    /// 8 KiB of 256 byte sectors, nine areas.
    Small,
}

pub static ALL_DEVICES: &[DeviceName] = &[DeviceName::Linear4k, DeviceName::Small];

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            DeviceName::Linear4k => "linear-4k",
            DeviceName::Small => "small-256",
        };
        f.write_str(name)
    }
}

/// Build the flash and area descriptors for a given device.
pub fn make_device(
    device: DeviceName,
    align: usize,
    erased_val: u8,
) -> Result<(SimFlash, AreaDescs), FlashError> {
    let (sectors, areas): (Vec<usize>, &[(usize, usize)]) = match device {
        DeviceName::Linear4k => (
            vec![4096; 256],
            &[
                (0x0000_0000, 16 * 1024),
                (0x0000_4000, 16 * 1024),
                (0x0000_8000, 16 * 1024),
                (0x0000_c000, 16 * 1024),
                (0x0001_0000, 64 * 1024),
                (0x0002_0000, 128 * 1024),
                (0x0004_0000, 128 * 1024),
                (0x0006_0000, 128 * 1024),
                (0x0008_0000, 128 * 1024),
                (0x000a_0000, 128 * 1024),
                (0x000c_0000, 128 * 1024),
                (0x000e_0000, 128 * 1024),
            ],
        ),
        DeviceName::Small => (
            vec![256; 32],
            &[
                (0x0000, 256),
                (0x0100, 256),
                (0x0200, 256),
                (0x0300, 256),
                (0x0400, 1024),
                (0x0800, 1024),
                (0x0c00, 1024),
                (0x1000, 2048),
                (0x1800, 2048),
            ],
        ),
    };

    let flash = SimFlash::new(sectors, align, erased_val)?;
    let mut adescs = AreaDescs::new(&flash);
    for &(base, len) in areas {
        adescs.add(base, len)?;
    }
    Ok((flash, adescs))
}
