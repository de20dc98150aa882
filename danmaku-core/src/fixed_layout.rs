//! Stacking of fixed (top and bottom) danmaku
//!
//! Top danmaku stack downwards from just below the top edge, bottom danmaku stack
//! upwards from just above the bottom edge. Each half keeps an ordered list of the
//! danmaku currently placed in it, and a newcomer takes the first gap tall enough
//! to hold it.

use crate::danmaku::FixedPosition;
use crate::store::{DanmakuKey, DanmakuStore};
use rand::{Rng, RngCore};
use std::collections::HashSet;

/// Distance kept free at the top and bottom edges
pub const EDGE_MARGIN: f64 = 4.0;

/// Vertical interval a stack may occupy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn height(&self) -> f64 {
        self.max - self.min
    }
}

/// Range available to top danmaku on a canvas of `canvas_height`
pub fn top_range(canvas_height: f64) -> Range {
    Range {
        min: EDGE_MARGIN,
        max: canvas_height / 2.0,
    }
}

/// Range available to bottom danmaku on a canvas of `canvas_height`
pub fn bottom_range(canvas_height: f64) -> Range {
    Range {
        min: canvas_height / 2.0,
        max: canvas_height - EDGE_MARGIN,
    }
}

/// Top and bottom stacks of fixed danmaku
#[derive(Debug, Default)]
pub struct FixedLayout {
    /// Sorted by ascending `top`
    top_stack: Vec<DanmakuKey>,
    /// Sorted by descending `top`
    bottom_stack: Vec<DanmakuKey>,
}

impl FixedLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys placed in the top half, top to bottom
    pub fn top_stack(&self) -> &[DanmakuKey] {
        &self.top_stack
    }

    /// Keys placed in the bottom half, bottom to top
    pub fn bottom_stack(&self) -> &[DanmakuKey] {
        &self.bottom_stack
    }

    /// Places one newly sent danmaku; returns whether it got a slot
    pub fn send(
        &mut self,
        store: &mut DanmakuStore,
        key: DanmakuKey,
        canvas_height: f64,
        rng: &mut dyn RngCore,
    ) -> bool {
        self.insert(store, key, canvas_height, rng)
    }

    /// Drops stack entries whose danmaku are no longer in the store
    pub fn retain_stored(&mut self, store: &DanmakuStore) {
        self.top_stack.retain(|k| store.contains(*k));
        self.bottom_stack.retain(|k| store.contains(*k));
    }

    fn insert(
        &mut self,
        store: &mut DanmakuStore,
        key: DanmakuKey,
        canvas_height: f64,
        rng: &mut dyn RngCore,
    ) -> bool {
        let Some(danmaku) = store.get(key) else {
            return false;
        };
        let Some(position) = danmaku.fixed().map(|f| f.position) else {
            return false;
        };
        let height = danmaku.height;
        let prior = danmaku.prior;

        let (stack, range) = match position {
            FixedPosition::Top => (&mut self.top_stack, top_range(canvas_height)),
            FixedPosition::Bottom => (&mut self.bottom_stack, bottom_range(canvas_height)),
        };
        let spans: Vec<(f64, f64)> = stack
            .iter()
            .filter_map(|k| store.get(*k))
            .map(|d| (d.top.unwrap_or(range.min), d.height))
            .collect();

        let slot = match position {
            FixedPosition::Top => find_top_slot(&spans, range, height),
            FixedPosition::Bottom => find_bottom_slot(&spans, range, height),
        };

        let top = match slot {
            Some((index, top)) => {
                stack.insert(index, key);
                top
            }
            None if prior => {
                let top = random_top(range, height, rng);
                stack.push(key);
                top
            }
            None => return false,
        };
        if let Some(danmaku) = store.get_mut(key) {
            danmaku.top = Some(top);
        }
        if slot.is_none() {
            sort_stack(stack, store, position);
        }
        true
    }

    /// Fixed danmaku to draw at `now`: the top stack followed by the bottom stack.
    ///
    /// Danmaku whose display window has closed leave the stacks, newly due danmaku
    /// are inserted, and `keys` keeps only danmaku that have not yet ended. The
    /// ended ones are pushed to `expired`.
    pub fn visible(
        &mut self,
        store: &mut DanmakuStore,
        keys: &mut Vec<DanmakuKey>,
        expired: &mut Vec<DanmakuKey>,
        now: i64,
        canvas_height: f64,
        rng: &mut dyn RngCore,
    ) -> Vec<DanmakuKey> {
        let due: Vec<DanmakuKey> = keys
            .iter()
            .copied()
            .filter(|k| {
                store.get(*k).is_some_and(|d| {
                    d.time <= now && d.fixed().is_some_and(|f| f.end_time >= now)
                })
            })
            .collect();
        let due_set: HashSet<DanmakuKey> = due.iter().copied().collect();

        self.top_stack.retain(|k| due_set.contains(k));
        self.bottom_stack.retain(|k| due_set.contains(k));

        for key in due {
            if !self.top_stack.contains(&key) && !self.bottom_stack.contains(&key) {
                self.insert(store, key, canvas_height, rng);
            }
        }

        keys.retain(|k| {
            let live = store
                .get(*k)
                .and_then(|d| d.fixed())
                .is_some_and(|f| f.end_time >= now);
            if !live {
                expired.push(*k);
            }
            live
        });

        self.top_stack
            .iter()
            .chain(self.bottom_stack.iter())
            .copied()
            .collect()
    }
}

/// First gap in a top stack that fits `height`: `(insert index, top)`
fn find_top_slot(spans: &[(f64, f64)], range: Range, height: f64) -> Option<(usize, f64)> {
    if spans.is_empty() {
        return (range.height() >= height).then_some((0, range.min));
    }
    for (i, &(top, h)) in spans.iter().enumerate() {
        if i == 0 && top - range.min >= height {
            return Some((0, range.min));
        }
        let gap = match spans.get(i + 1) {
            Some(&(next_top, _)) => next_top - top - h,
            None => range.max - top - h,
        };
        if gap >= height {
            return Some((i + 1, top + h));
        }
    }
    None
}

/// First gap in a bottom stack that fits `height`: `(insert index, top)`
fn find_bottom_slot(spans: &[(f64, f64)], range: Range, height: f64) -> Option<(usize, f64)> {
    if spans.is_empty() {
        return (range.height() >= height).then_some((0, range.max - height));
    }
    for (i, &(top, h)) in spans.iter().enumerate() {
        if i == 0 && range.max - top - h >= height {
            return Some((0, range.max - height));
        }
        let gap = match spans.get(i + 1) {
            Some(&(next_top, next_h)) => top - next_top - next_h,
            None => top - range.min,
        };
        if gap >= height {
            return Some((i + 1, top - height));
        }
    }
    None
}

/// Random whole-pixel top that keeps the danmaku inside `range` when possible
fn random_top(range: Range, height: f64, rng: &mut dyn RngCore) -> f64 {
    let min = range.min.ceil() as i64;
    let max = (range.max - height).floor() as i64;
    if max <= min {
        return range.min;
    }
    rng.random_range(min..=max) as f64
}

fn sort_stack(stack: &mut [DanmakuKey], store: &DanmakuStore, position: FixedPosition) {
    let top_of = |k: &DanmakuKey| store.get(*k).and_then(|d| d.top).unwrap_or(0.0);
    match position {
        FixedPosition::Top => stack.sort_by(|a, b| top_of(a).total_cmp(&top_of(b))),
        FixedPosition::Bottom => stack.sort_by(|a, b| top_of(b).total_cmp(&top_of(a))),
    }
}
