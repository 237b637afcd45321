//! Shared fixtures: a small log-structured filesystem to drive through the
//! harness, and test logging.

#![allow(dead_code)]

use std::collections::BTreeMap;

use flashsim::{
    Access, AreaDescs, DeviceName, Env, FileSystem, FsError, FsResult, Handle, Harness,
    PoolConfig, PoolKind, PoolObjects, SimFlash, make_device,
};

/// Route `log` output through the test harness' capture.
pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const MAGIC: u32 = 0xb98a_31e2;
const AREA_HEADER_LEN: u32 = 8;
const RECORD_HEADER_LEN: usize = 7;
const RECORD_CRC_LEN: usize = 2;

/// Largest data payload per record.
pub const CHUNK: usize = 64;

const KIND_INODE: u8 = 1;
const KIND_DATA: u8 = 2;
const KIND_DELETE: u8 = 3;

pub struct Objects;

impl PoolObjects for Objects {
    type File = OpenFile;
    type Dir = ();
    type Inode = InodeEntry;
    type Block = ();
    type CacheInode = ();
    type CacheBlock = ();
}

#[derive(Debug, Default)]
pub struct OpenFile {
    pub inode: u32,
    pub access: u8,
}

#[derive(Debug, Default)]
pub struct InodeEntry {
    pub id: u32,
}

struct FileState {
    name: String,
    data: Vec<u8>,
    slot: Handle,
}

/// Append-only record log spread across the areas in order.
///
/// Each area starts with a magic header. Records are
/// `kind:u8 id:u32 len:u16 payload crc16`, padded to the write alignment.
/// Every record goes out in a single flash write, so a power cut either
/// lands before a record or after it.
#[derive(Default)]
pub struct LogFs {
    files: BTreeMap<u32, FileState>,
    next_id: u32,
    /// Area index and offset of the next record; `None` until mounted.
    cursor: Option<(usize, u32)>,
}

impl LogFs {
    pub fn contents(&self, name: &str) -> Option<&[u8]> {
        self.files
            .values()
            .find(|f| f.name == name)
            .map(|f| f.data.as_slice())
    }

    pub fn names(&self) -> Vec<&str> {
        self.files.values().map(|f| f.name.as_str()).collect()
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.files
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(&id, _)| id)
    }

    fn mounted(&self) -> FsResult<(usize, u32)> {
        self.cursor
            .ok_or_else(|| FsError::Invalid("filesystem not mounted".to_string()))
    }

    fn append(&mut self, env: &mut Env<'_, Objects>, kind: u8, id: u32, payload: &[u8]) -> FsResult<()> {
        let mut rec = Vec::with_capacity(RECORD_HEADER_LEN + payload.len() + RECORD_CRC_LEN);
        rec.push(kind);
        rec.extend_from_slice(&id.to_le_bytes());
        rec.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        rec.extend_from_slice(payload);
        let crc = env.flash.crc16(0, &rec);
        rec.extend_from_slice(&crc.to_le_bytes());
        rec.resize(padded(rec.len(), env.flash.align()), 0);

        let (mut area, mut off) = self.mounted()?;
        let len = rec.len() as u32;
        while off + len > env.areas()[area].length {
            area += 1;
            if area == env.areas().len() {
                return Err(FsError::Full);
            }
            off = AREA_HEADER_LEN;
        }

        let desc = env.areas()[area];
        env.flash.write(desc.flash_id, desc.offset + off, &rec)?;
        self.cursor = Some((area, off + len));
        Ok(())
    }

    fn apply(&mut self, env: &mut Env<'_, Objects>, kind: u8, id: u32, payload: &[u8]) -> FsResult<()> {
        self.next_id = self.next_id.max(id + 1);
        match kind {
            KIND_INODE => {
                let name = String::from_utf8(payload.to_vec())
                    .map_err(|_| FsError::Corrupt(format!("inode {id} has a bad name")))?;
                match self.files.get_mut(&id) {
                    Some(file) => file.name = name,
                    None => {
                        let slot = new_inode(env, id);
                        self.files.insert(
                            id,
                            FileState {
                                name,
                                data: Vec::new(),
                                slot,
                            },
                        );
                    }
                }
            }
            KIND_DATA => {
                let file = self
                    .files
                    .get_mut(&id)
                    .ok_or_else(|| FsError::Corrupt(format!("data for unknown inode {id}")))?;
                file.data.extend_from_slice(payload);
            }
            KIND_DELETE => {
                if let Some(file) = self.files.remove(&id) {
                    env.pools.release(PoolKind::Inode, file.slot);
                }
            }
            other => return Err(FsError::Corrupt(format!("record kind {other}"))),
        }
        Ok(())
    }
}

fn padded(len: usize, align: usize) -> usize {
    len.div_ceil(align) * align
}

fn new_inode(env: &mut Env<'_, Objects>, id: u32) -> Handle {
    let slot = env.pools.acquire(PoolKind::Inode);
    env.pools.inodes_mut().get_mut(slot).id = id;
    slot
}

impl FileSystem for LogFs {
    type Objects = Objects;
    type File = Handle;

    fn format(&mut self, env: &mut Env<'_, Objects>) -> FsResult<()> {
        env.pools.reset();
        self.files.clear();
        self.cursor = None;
        self.next_id = 1;

        let areas = env.areas().to_vec();
        for (idx, area) in areas.iter().enumerate() {
            env.flash.erase(area.flash_id, area.offset, area.length)?;
            let mut header = [0u8; AREA_HEADER_LEN as usize];
            header[..4].copy_from_slice(&MAGIC.to_le_bytes());
            header[4] = idx as u8;
            env.flash.write(area.flash_id, area.offset, &header)?;
        }
        self.cursor = Some((0, AREA_HEADER_LEN));
        Ok(())
    }

    fn restore(&mut self, env: &mut Env<'_, Objects>) -> FsResult<()> {
        env.pools.reset();
        self.files.clear();
        self.cursor = None;
        self.next_id = 1;

        let areas = env.areas().to_vec();
        let erased = env.flash.erased_val();
        let align = env.flash.align();
        let mut cursor = (0, AREA_HEADER_LEN);

        for (idx, area) in areas.iter().enumerate() {
            let mut header = [0u8; AREA_HEADER_LEN as usize];
            env.flash.read(area.flash_id, area.offset, &mut header)?;
            let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            if magic != MAGIC || header[4] != idx as u8 {
                return Err(FsError::Corrupt(format!("area {idx} has no header")));
            }

            let mut off = AREA_HEADER_LEN;
            while off as usize + RECORD_HEADER_LEN <= area.length as usize {
                let mut head = [0u8; RECORD_HEADER_LEN];
                env.flash.read(area.flash_id, area.offset + off, &mut head)?;
                if head[0] == erased {
                    break;
                }
                let len = u16::from_le_bytes([head[5], head[6]]) as usize;
                let total = padded(RECORD_HEADER_LEN + len + RECORD_CRC_LEN, align);
                if off as usize + total > area.length as usize {
                    break;
                }

                let mut rec = vec![0u8; total];
                env.flash.read(area.flash_id, area.offset + off, &mut rec)?;
                let body = &rec[..RECORD_HEADER_LEN + len];
                let stored = u16::from_le_bytes([rec[body.len()], rec[body.len() + 1]]);
                if env.flash.crc16(0, body) != stored {
                    break;
                }

                let id = u32::from_le_bytes([rec[1], rec[2], rec[3], rec[4]]);
                let payload = rec[RECORD_HEADER_LEN..RECORD_HEADER_LEN + len].to_vec();
                self.apply(env, rec[0], id, &payload)?;
                off += total as u32;
                cursor = (idx, off);
            }
        }

        self.cursor = Some(cursor);
        Ok(())
    }

    fn open(&mut self, env: &mut Env<'_, Objects>, path: &str, access: Access) -> FsResult<Handle> {
        self.mounted()?;
        let id = match self.lookup(path) {
            Some(id) => id,
            None if access.contains(Access::WRITE) => {
                let id = self.next_id;
                self.append(env, KIND_INODE, id, path.as_bytes())?;
                self.next_id += 1;
                let slot = new_inode(env, id);
                self.files.insert(
                    id,
                    FileState {
                        name: path.to_string(),
                        data: Vec::new(),
                        slot,
                    },
                );
                id
            }
            None => return Err(FsError::NotFound(path.to_string())),
        };

        let handle = env.pools.acquire(PoolKind::File);
        *env.pools.files_mut().get_mut(handle) = OpenFile {
            inode: id,
            access: access.bits(),
        };
        Ok(handle)
    }

    fn write(&mut self, env: &mut Env<'_, Objects>, file: &Handle, data: &[u8]) -> FsResult<()> {
        let open = env.pools.files().get(*file);
        let id = open.inode;
        if open.access & Access::WRITE.bits() == 0 {
            return Err(FsError::Access);
        }
        for chunk in data.chunks(CHUNK) {
            self.append(env, KIND_DATA, id, chunk)?;
            let state = self
                .files
                .get_mut(&id)
                .ok_or_else(|| FsError::NotFound(format!("inode {id}")))?;
            state.data.extend_from_slice(chunk);
        }
        Ok(())
    }

    fn close(&mut self, env: &mut Env<'_, Objects>, file: Handle) -> FsResult<()> {
        env.pools.release(PoolKind::File, file);
        Ok(())
    }

    fn rename(&mut self, env: &mut Env<'_, Objects>, from: &str, to: &str) -> FsResult<()> {
        self.mounted()?;
        let id = self
            .lookup(from)
            .ok_or_else(|| FsError::NotFound(from.to_string()))?;
        if self.lookup(to).is_some() {
            return Err(FsError::Exists(to.to_string()));
        }
        self.append(env, KIND_INODE, id, to.as_bytes())?;
        if let Some(file) = self.files.get_mut(&id) {
            file.name = to.to_string();
        }
        Ok(())
    }

    fn unlink(&mut self, env: &mut Env<'_, Objects>, path: &str) -> FsResult<()> {
        self.mounted()?;
        let id = self
            .lookup(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        self.append(env, KIND_DELETE, id, &[])?;
        if let Some(file) = self.files.remove(&id) {
            env.pools.release(PoolKind::Inode, file.slot);
        }
        Ok(())
    }
}

/// A harness around a fresh `LogFs`, plus a formatted small device.
pub fn formatted() -> (Harness<LogFs>, SimFlash, AreaDescs) {
    setup();
    let (mut flash, areas) = make_device(DeviceName::Small, 1, 0xff).unwrap();
    let mut harness = Harness::new(LogFs::default(), &PoolConfig::default());
    assert_eq!(harness.format(&mut flash, &areas), 0);
    (harness, flash, areas)
}

/// Writes and erases a format of `areas` performs.
pub fn format_ops(areas: &AreaDescs) -> u64 {
    2 * areas.len() as u64
}
