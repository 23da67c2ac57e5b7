// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bit-exact shared-region layout. Port of `cab_io_map()` / the
// `CAB_SHM_SIZE` / `CAB_CD_OFFS_A` constants from `os_cable.c`.

use std::sync::atomic::{AtomicI32, Ordering};

/// Control-ring capacity, matching `CAB_Q_SIZE`.
pub const RING_CAPACITY: usize = 4;
/// Payload buffer size, matching `OS_BUF_SIZE`.
pub const BUF_SIZE: usize = 2048;

/// One control-ring slot: `{id, size, consumed}`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RingSlot {
    pub id: u8,
    pub size: i32,
    pub consumed: i32,
}

impl Default for RingSlot {
    fn default() -> Self {
        Self {
            id: 0,
            size: 0,
            consumed: 0,
        }
    }
}

/// A fixed 4-slot control ring living in shared memory.
///
/// `head`/`tail` are atomics so that writes by one endpoint's sender and
/// reads by the peer's interrupt thread establish a happens-before edge
/// for the slot contents beneath them: the writer stores the slot, then
/// publishes it with `head.store(_, Release)`; the reader observes the new
/// head with `Acquire` before reading the slot it names.
#[repr(C)]
pub struct RingHeader {
    pub slots: [RingSlot; RING_CAPACITY],
    pub head: AtomicI32,
    pub tail: AtomicI32,
}

/// Total byte size of one [`RingHeader`], i.e. `R` in the spec.
pub const fn ring_size() -> usize {
    std::mem::size_of::<RingHeader>()
}

/// Word alignment used between the two cable pairs.
const WORD_ALIGN: usize = std::mem::align_of::<usize>();

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Byte size of one cable pair: two rings + two payload buffers.
pub const fn pair_size() -> usize {
    2 * ring_size() + 2 * BUF_SIZE
}

/// Start offset of the second cable pair (`/ctrl_disp`, `/display`).
pub const fn second_pair_offset() -> usize {
    align_up(pair_size(), WORD_ALIGN)
}

/// Total size of the shared region covering both cable pairs.
pub const fn region_size() -> usize {
    second_pair_offset() + pair_size()
}

/// Which of the two rings/payload buffers in a pair is "in" vs "out" for an
/// endpoint is entirely determined by its role: a controller's ring A /
/// buffer A pair is its *in* channel and ring B / buffer B is its *out*
/// channel; a follower's assignment is reversed. Mirrors `cab_io_map`'s
/// `is_ctrl` branch in `os_cable.c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Controller,
    Follower,
}

/// Raw pointers to one endpoint's in/out ring and payload buffer, computed
/// from the pair's base address and the endpoint's role.
pub struct ChannelAddrs {
    pub in_ring: *mut RingHeader,
    pub in_payload: *mut u8,
    pub out_ring: *mut RingHeader,
    pub out_payload: *mut u8,
}

/// Compute the channel addresses for a pair starting at `pair_base`
/// (`pair_base` already includes the endpoint's `start_offset`).
///
/// # Safety
/// `pair_base` must point to a mapped region of at least `pair_size()` bytes
/// that outlives the returned pointers.
pub unsafe fn map_channels(pair_base: *mut u8, role: Role) -> ChannelAddrs {
    let ring_a = pair_base as *mut RingHeader;
    let ring_b = pair_base.add(ring_size()) as *mut RingHeader;
    let payload_a = pair_base.add(2 * ring_size());
    let payload_b = pair_base.add(2 * ring_size() + BUF_SIZE);

    match role {
        Role::Controller => ChannelAddrs {
            in_ring: ring_a,
            in_payload: payload_a,
            out_ring: ring_b,
            out_payload: payload_b,
        },
        Role::Follower => ChannelAddrs {
            in_ring: ring_b,
            in_payload: payload_b,
            out_ring: ring_a,
            out_payload: payload_a,
        },
    }
}
