//! Bookkeeping for nonblocking requests.
//!
//! Requests live in an arena of slots. A [`RequestId`] names a slot and the
//! generation of its occupant, so an id that outlived its request is
//! reported as unknown instead of naming whatever reuses the slot.
//!
//! A request is posted, committed by `wait_all`, and completed with a
//! status. A posted request may instead be cancelled, which removes it.

use crate::buffer::Reservation;
use crate::element::NcType;
use crate::error::{Error, ErrorCode, Result};
use crate::schema::VarId;
use crate::slice::SliceDescriptor;
use std::fmt;

/// Identifies a nonblocking request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId {
    index: u32,
    generation: u32,
}

impl RequestId {
    /// Returned for requests that select no elements. Such requests are
    /// complete as soon as they are posted.
    pub const NULL: RequestId = RequestId {
        index: u32::MAX,
        generation: 0,
    };

    pub fn is_null(self) -> bool {
        self == RequestId::NULL
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_null() {
            write!(f, "#null")
        } else {
            write!(f, "#{}.{}", self.index, self.generation)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Lifecycle of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    /// Posted and not yet handed to the store.
    Posted,
    /// Handed to the store, completion not yet reported.
    Committed,
    /// Finished with the given status.
    Completed(ErrorCode),
}

/// Which requests an operation targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requests {
    /// Every posted request.
    All,
    /// Every posted write.
    AllWrites,
    /// Every posted read.
    AllReads,
    Ids(Vec<RequestId>),
}

impl From<RequestId> for Requests {
    fn from(id: RequestId) -> Requests {
        Requests::Ids(vec![id])
    }
}

impl From<Vec<RequestId>> for Requests {
    fn from(ids: Vec<RequestId>) -> Requests {
        Requests::Ids(ids)
    }
}

impl<'a> From<&'a [RequestId]> for Requests {
    fn from(ids: &'a [RequestId]) -> Requests {
        Requests::Ids(ids.to_vec())
    }
}

/// What a request carries besides its region.
#[derive(Debug)]
pub(crate) enum Payload {
    /// A read that has not completed yet.
    Pending,
    /// Encoded values owned by the request.
    Owned(Vec<u8>),
    /// Encoded values staged in the attached buffer.
    Staged(Reservation),
    /// Values delivered by a completed read, in selection order.
    Received(Vec<u8>),
}

#[derive(Debug)]
pub(crate) struct Entry {
    pub var: VarId,
    pub nc_type: NcType,
    pub desc: SliceDescriptor,
    pub direction: Direction,
    pub payload: Payload,
    pub state: RequestState,
    seq: u64,
}

impl Entry {
    pub fn new(
        var: VarId,
        nc_type: NcType,
        desc: SliceDescriptor,
        direction: Direction,
        payload: Payload,
    ) -> Entry {
        Entry {
            var,
            nc_type,
            desc,
            direction,
            payload,
            state: RequestState::Posted,
            seq: 0,
        }
    }

    fn matches(&self, requests: &Requests) -> bool {
        match requests {
            Requests::All => true,
            Requests::AllWrites => self.direction == Direction::Write,
            Requests::AllReads => self.direction == Direction::Read,
            Requests::Ids(_) => false,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// The live requests of one dataset.
#[derive(Debug, Default)]
pub(crate) struct RequestTracker {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_seq: u64,
}

impl RequestTracker {
    pub fn new() -> RequestTracker {
        RequestTracker::default()
    }

    /// Registers a posted request.
    pub fn post(&mut self, mut entry: Entry) -> RequestId {
        entry.state = RequestState::Posted;
        entry.seq = self.next_seq;
        self.next_seq += 1;
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.entry = Some(entry);
        let id = RequestId {
            index,
            generation: slot.generation,
        };
        log::trace!("posted request {}", id);
        id
    }

    fn slot(&self, id: RequestId) -> Option<&Slot> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.entry.is_some())
    }

    pub fn get(&self, id: RequestId) -> Result<&Entry> {
        self.slot(id)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(Error::UnknownRequest(id))
    }

    pub fn get_mut(&mut self, id: RequestId) -> Result<&mut Entry> {
        if self.slot(id).is_none() {
            return Err(Error::UnknownRequest(id));
        }
        self.slots[id.index as usize]
            .entry
            .as_mut()
            .ok_or(Error::UnknownRequest(id))
    }

    /// Removes a request and frees its slot for reuse.
    pub fn remove(&mut self, id: RequestId) -> Result<Entry> {
        if self.slot(id).is_none() {
            return Err(Error::UnknownRequest(id));
        }
        let slot = &mut self.slots[id.index as usize];
        let entry = slot.entry.take().ok_or(Error::UnknownRequest(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Ok(entry)
    }

    pub fn status(&self, id: RequestId) -> Result<RequestState> {
        if id.is_null() {
            return Ok(RequestState::Completed(ErrorCode::NOERR));
        }
        self.get(id).map(|entry| entry.state)
    }

    /// Number of requests in the given state.
    pub fn count(&self, state: RequestState) -> usize {
        self.entries().filter(|(_, e)| e.state == state).count()
    }

    /// Number of posted requests.
    pub fn pending(&self) -> usize {
        self.count(RequestState::Posted)
    }

    fn entries(&self) -> impl Iterator<Item = (RequestId, &Entry)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    RequestId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    entry,
                )
            })
        })
    }

    /// The posted requests selected by `requests`, in post order.
    ///
    /// Null ids are skipped. An explicit id that is not posted fails the
    /// whole selection.
    pub fn select(&self, requests: &Requests) -> Result<Vec<RequestId>> {
        let mut selected: Vec<(u64, RequestId)> = match requests {
            Requests::Ids(ids) => {
                let mut out = Vec::with_capacity(ids.len());
                for &id in ids.iter().filter(|id| !id.is_null()) {
                    let entry = self.get(id)?;
                    if entry.state != RequestState::Posted {
                        return Err(Error::UnknownRequest(id));
                    }
                    out.push((entry.seq, id));
                }
                out
            }
            _ => self
                .entries()
                .filter(|(_, e)| e.state == RequestState::Posted && e.matches(requests))
                .map(|(id, e)| (e.seq, id))
                .collect(),
        };
        selected.sort_unstable_by_key(|&(seq, _)| seq);
        selected.dedup();
        Ok(selected.into_iter().map(|(_, id)| id).collect())
    }
}

impl Drop for RequestTracker {
    fn drop(&mut self) {
        let pending = self.pending();
        if pending > 0 {
            log::warn!(
                "dataset dropped with {} pending nonblocking requests; their data is lost",
                pending
            );
        }
    }
}
