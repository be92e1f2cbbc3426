//! Rebasing of journaled list records over queued remote changes.
//!
//! Between two flushes the mirror and the document can both move away from
//! the list state they last agreed on: the mirror through journaled local
//! mutations, the document through remote commits that are queued but not
//! reconciled yet. Journal indices refer to the mirror, so before a record
//! is written its indices are translated into the document's current
//! frame.
//!
//! Both sides are simulated as sequences of slots. An item of the agreed
//! state keeps its slot on both sides, so a local insertion lands right
//! after the nearest preceding item the document still holds, and a local
//! deletion only removes items the document still holds.

use crate::{document::RangeOp, mirror::LocalOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Item at this position of the agreed state
    Agreed(usize),
    /// Item inserted by a queued remote commit
    Remote,
    /// Item inserted by a journaled record
    Local(usize),
}

/// Translates the records of one list into the document frame.
#[derive(Debug)]
pub(crate) struct ListRebase {
    document: Vec<Slot>,
    mirror: Vec<Slot>,
    next_local: usize,
}

impl ListRebase {
    /// `document_len` is the list's current document length and `deltas`
    /// are its queued remote deltas in commit order.
    pub(crate) fn new(document_len: usize, deltas: &[Vec<RangeOp>]) -> Self {
        let net: isize = deltas
            .iter()
            .flatten()
            .map(|op| match op {
                RangeOp::Retain(_) => 0,
                RangeOp::Delete(len) => -(*len as isize),
                RangeOp::Insert(items) => items.len() as isize,
            })
            .sum();
        let agreed_len = (document_len as isize - net).max(0) as usize;
        let mirror: Vec<Slot> = (0..agreed_len).map(Slot::Agreed).collect();
        let mut document = mirror.clone();
        for ops in deltas {
            let mut position = 0usize;
            for op in ops {
                match op {
                    RangeOp::Retain(len) => position += *len as usize,
                    RangeOp::Delete(len) => {
                        let start = position.min(document.len());
                        let end = start.saturating_add(*len as usize).min(document.len());
                        document.drain(start..end);
                    }
                    RangeOp::Insert(items) => {
                        let start = position.min(document.len());
                        let remote = std::iter::repeat_n(Slot::Remote, items.len());
                        document.splice(start..start, remote);
                        position = start + items.len();
                    }
                }
            }
        }
        Self {
            document,
            mirror,
            next_local: 0,
        }
    }

    /// Translates one record. A record can turn into several operations
    /// (a deletion spanning remote insertions) or into none at all (a
    /// deletion of items a peer deleted already).
    pub(crate) fn rebase(&mut self, op: LocalOp) -> Vec<LocalOp> {
        match op {
            LocalOp::ListInsert { index, values } => {
                let index = index.min(self.mirror.len());
                let at = self.anchor(index);
                let slots: Vec<Slot> = values.iter().map(|_| self.local_slot()).collect();
                self.mirror.splice(index..index, slots.iter().copied());
                self.document.splice(at..at, slots);
                vec![LocalOp::ListInsert { index: at, values }]
            }
            LocalOp::ListDelete { index, count } => {
                let start = index.min(self.mirror.len());
                let end = start.saturating_add(count).min(self.mirror.len());
                let removed: Vec<Slot> = self.mirror.drain(start..end).collect();
                let mut ops: Vec<LocalOp> = Vec::new();
                for slot in removed {
                    let Some(at) = self.find(slot) else {
                        continue;
                    };
                    self.document.remove(at);
                    match ops.last_mut() {
                        Some(LocalOp::ListDelete { index, count }) if *index == at => *count += 1,
                        _ => ops.push(LocalOp::ListDelete { index: at, count: 1 }),
                    }
                }
                ops
            }
            LocalOp::ListReplace { index, value } => {
                let Some(previous) = self.mirror.get(index).copied() else {
                    return vec![LocalOp::ListReplace { index, value }];
                };
                let slot = self.local_slot();
                self.mirror[index] = slot;
                match self.find(previous) {
                    Some(at) => {
                        self.document[at] = slot;
                        vec![LocalOp::ListReplace { index: at, value }]
                    }
                    None => {
                        let at = self.anchor(index);
                        self.document.insert(at, slot);
                        vec![LocalOp::ListInsert {
                            index: at,
                            values: vec![value],
                        }]
                    }
                }
            }
            keyed => vec![keyed],
        }
    }

    fn local_slot(&mut self) -> Slot {
        self.next_local += 1;
        Slot::Local(self.next_local)
    }

    fn find(&self, slot: Slot) -> Option<usize> {
        self.document.iter().position(|candidate| *candidate == slot)
    }

    /// Document position right after the last item before mirror position
    /// `index` that the document still holds.
    fn anchor(&self, index: usize) -> usize {
        self.mirror[..index]
            .iter()
            .rev()
            .find_map(|slot| self.find(*slot))
            .map_or(0, |at| at + 1)
    }
}
