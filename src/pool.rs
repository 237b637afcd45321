//! Fixed-capacity object pools.
//!
//! The engine under test never allocates: every file handle, directory
//! handle, inode entry, block entry and cache object comes out of a pool
//! whose capacity is fixed when the harness starts. Running out of slots, or
//! handing back a slot that is not checked out, is a bug in the test setup
//! and stops the run.

use std::fmt;

use crate::config::PoolConfig;

/// The six object kinds the engine allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    File,
    Dir,
    Inode,
    Block,
    CacheInode,
    CacheBlock,
}

impl PoolKind {
    pub const ALL: [PoolKind; 6] = [
        PoolKind::File,
        PoolKind::Dir,
        PoolKind::Inode,
        PoolKind::Block,
        PoolKind::CacheInode,
        PoolKind::CacheBlock,
    ];

    fn capacity_in(self, config: &PoolConfig) -> u32 {
        match self {
            PoolKind::File => config.num_files,
            PoolKind::Dir => config.num_dirs,
            PoolKind::Inode => config.num_inodes,
            PoolKind::Block => config.num_blocks,
            PoolKind::CacheInode => config.num_cache_inodes,
            PoolKind::CacheBlock => config.num_cache_blocks,
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            PoolKind::File => "file",
            PoolKind::Dir => "dir",
            PoolKind::Inode => "inode",
            PoolKind::Block => "block",
            PoolKind::CacheInode => "cache-inode",
            PoolKind::CacheBlock => "cache-block",
        };
        f.write_str(name)
    }
}

/// Identity of one checked-out slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    kind: PoolKind,
    index: u32,
}

impl Handle {
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Slot position inside its pool's backing store.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// Object types stored in each pool, chosen by the engine.
pub trait PoolObjects {
    type File: Default;
    type Dir: Default;
    type Inode: Default;
    type Block: Default;
    type CacheInode: Default;
    type CacheBlock: Default;
}

/// One pool: a flat backing store plus an occupancy bitmap.
pub struct Pool<T> {
    kind: PoolKind,
    slots: Box<[T]>,
    in_use: Box<[bool]>,
}

impl<T: Default> Pool<T> {
    /// Allocate `capacity` slots up front.
    ///
    /// # Panics
    ///
    /// Panics if the host cannot provide the backing store.
    pub fn new(kind: PoolKind, capacity: u32) -> Self {
        let capacity = capacity as usize;
        let mut slots = reserved(kind, capacity);
        slots.resize_with(capacity, T::default);
        let mut in_use = reserved(kind, capacity);
        in_use.resize(capacity, false);

        Self {
            kind,
            slots: slots.into_boxed_slice(),
            in_use: in_use.into_boxed_slice(),
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn in_use(&self) -> usize {
        self.in_use.iter().filter(|&&used| used).count()
    }

    pub fn is_occupied(&self, handle: Handle) -> bool {
        handle.kind == self.kind && self.in_use.get(handle.index()).copied().unwrap_or(false)
    }

    /// Check out the first free slot, reset to its default value.
    ///
    /// # Panics
    ///
    /// Panics when every slot is occupied.
    pub fn acquire(&mut self) -> Handle {
        let Some(index) = self.in_use.iter().position(|&used| !used) else {
            log::error!("{} pool exhausted ({} slots)", self.kind, self.capacity());
            panic!("{} pool exhausted ({} slots)", self.kind, self.capacity());
        };
        self.in_use[index] = true;
        self.slots[index] = T::default();
        log::trace!("{} pool: acquire slot {}", self.kind, index);
        Handle {
            kind: self.kind,
            index: index as u32,
        }
    }

    /// Return a slot to the pool.
    ///
    /// # Panics
    ///
    /// Panics if `handle` belongs to another pool or its slot is not checked out.
    pub fn release(&mut self, handle: Handle) {
        self.check(handle, "release");
        self.in_use[handle.index()] = false;
        log::trace!("{} pool: release slot {}", self.kind, handle.index);
    }

    pub fn get(&self, handle: Handle) -> &T {
        self.check(handle, "get");
        &self.slots[handle.index()]
    }

    pub fn get_mut(&mut self, handle: Handle) -> &mut T {
        self.check(handle, "get");
        &mut self.slots[handle.index()]
    }

    /// Mark every slot free without touching the backing store.
    pub fn reset(&mut self) {
        self.in_use.fill(false);
    }

    fn check(&self, handle: Handle, op: &str) {
        if !self.is_occupied(handle) {
            log::error!("{} pool: {op} of foreign or stale handle {:?}", self.kind, handle);
            panic!("{} pool: {op} of foreign or stale handle {:?}", self.kind, handle);
        }
    }
}

/// An empty vector with room for `capacity` elements.
///
/// # Panics
///
/// Panics if the host cannot provide the memory.
fn reserved<T>(kind: PoolKind, capacity: usize) -> Vec<T> {
    let mut store = Vec::new();
    if let Err(err) = store.try_reserve_exact(capacity) {
        log::error!("{kind} pool: cannot allocate {capacity} slots: {err}");
        panic!("{kind} pool: cannot allocate {capacity} slots: {err}");
    }
    store
}

/// Occupancy operations every pool supports regardless of object type.
trait Slots {
    fn acquire(&mut self) -> Handle;
    fn release(&mut self, handle: Handle);
    fn reset(&mut self);
    fn in_use(&self) -> usize;
    fn capacity(&self) -> usize;
}

impl<T: Default> Slots for Pool<T> {
    fn acquire(&mut self) -> Handle {
        Pool::acquire(self)
    }

    fn release(&mut self, handle: Handle) {
        Pool::release(self, handle)
    }

    fn reset(&mut self) {
        Pool::reset(self)
    }

    fn in_use(&self) -> usize {
        Pool::in_use(self)
    }

    fn capacity(&self) -> usize {
        Pool::capacity(self)
    }
}

/// All six pools of one harness.
pub struct Pools<O: PoolObjects> {
    files: Pool<O::File>,
    dirs: Pool<O::Dir>,
    inodes: Pool<O::Inode>,
    blocks: Pool<O::Block>,
    cache_inodes: Pool<O::CacheInode>,
    cache_blocks: Pool<O::CacheBlock>,
}

impl<O: PoolObjects> Pools<O> {
    /// Allocate every pool; unset capacities take their defaults.
    pub fn new(config: &PoolConfig) -> Self {
        let config = config.resolved();
        let cap = |kind: PoolKind| kind.capacity_in(&config);
        Self {
            files: Pool::new(PoolKind::File, cap(PoolKind::File)),
            dirs: Pool::new(PoolKind::Dir, cap(PoolKind::Dir)),
            inodes: Pool::new(PoolKind::Inode, cap(PoolKind::Inode)),
            blocks: Pool::new(PoolKind::Block, cap(PoolKind::Block)),
            cache_inodes: Pool::new(PoolKind::CacheInode, cap(PoolKind::CacheInode)),
            cache_blocks: Pool::new(PoolKind::CacheBlock, cap(PoolKind::CacheBlock)),
        }
    }

    fn slots(&self, kind: PoolKind) -> &dyn Slots {
        match kind {
            PoolKind::File => &self.files,
            PoolKind::Dir => &self.dirs,
            PoolKind::Inode => &self.inodes,
            PoolKind::Block => &self.blocks,
            PoolKind::CacheInode => &self.cache_inodes,
            PoolKind::CacheBlock => &self.cache_blocks,
        }
    }

    fn slots_mut(&mut self, kind: PoolKind) -> &mut dyn Slots {
        match kind {
            PoolKind::File => &mut self.files,
            PoolKind::Dir => &mut self.dirs,
            PoolKind::Inode => &mut self.inodes,
            PoolKind::Block => &mut self.blocks,
            PoolKind::CacheInode => &mut self.cache_inodes,
            PoolKind::CacheBlock => &mut self.cache_blocks,
        }
    }

    pub fn acquire(&mut self, kind: PoolKind) -> Handle {
        self.slots_mut(kind).acquire()
    }

    /// # Panics
    ///
    /// Panics if `handle` was not acquired from the `kind` pool or was
    /// already released.
    pub fn release(&mut self, kind: PoolKind, handle: Handle) {
        if handle.kind != kind {
            log::error!("{kind} pool: release of {} handle {:?}", handle.kind, handle);
            panic!("{kind} pool: release of {} handle {:?}", handle.kind, handle);
        }
        self.slots_mut(kind).release(handle)
    }

    pub fn in_use(&self, kind: PoolKind) -> usize {
        self.slots(kind).in_use()
    }

    pub fn capacity(&self, kind: PoolKind) -> usize {
        self.slots(kind).capacity()
    }

    /// Free every slot of every pool, as a remount does.
    pub fn reset(&mut self) {
        for kind in PoolKind::ALL {
            self.slots_mut(kind).reset();
        }
    }

    pub fn files(&self) -> &Pool<O::File> {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut Pool<O::File> {
        &mut self.files
    }

    pub fn dirs(&self) -> &Pool<O::Dir> {
        &self.dirs
    }

    pub fn dirs_mut(&mut self) -> &mut Pool<O::Dir> {
        &mut self.dirs
    }

    pub fn inodes(&self) -> &Pool<O::Inode> {
        &self.inodes
    }

    pub fn inodes_mut(&mut self) -> &mut Pool<O::Inode> {
        &mut self.inodes
    }

    pub fn blocks(&self) -> &Pool<O::Block> {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut Pool<O::Block> {
        &mut self.blocks
    }

    pub fn cache_inodes(&self) -> &Pool<O::CacheInode> {
        &self.cache_inodes
    }

    pub fn cache_inodes_mut(&mut self) -> &mut Pool<O::CacheInode> {
        &mut self.cache_inodes
    }

    pub fn cache_blocks(&self) -> &Pool<O::CacheBlock> {
        &self.cache_blocks
    }

    pub fn cache_blocks_mut(&mut self) -> &mut Pool<O::CacheBlock> {
        &mut self.cache_blocks
    }
}
