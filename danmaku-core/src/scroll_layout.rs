//! Track allocation for scrolling danmaku
//!
//! The render region is cut into equal-height *real tracks*. Every contiguous run
//! of real tracks forms a *virtual track*; a danmaku that needs `grade` real tracks
//! is placed on one virtual track of that grade. A virtual track accepts a
//! danmaku only when its last member has fully entered the screen before the
//! newcomer does, so members of one track never overlap horizontally.

use crate::danmaku::Danmaku;
use crate::store::{DanmakuKey, DanmakuStore};
use crate::timeline::sweep_offset;
use rand::{Rng, RngCore};
use std::collections::{HashMap, VecDeque};
use std::ops::RangeInclusive;
use std::time::Instant;

/// Vertical gap added to the typical danmaku height to get the track height
pub const TRACK_GAP: f64 = 10.0;

/// Settings the scroll layout reads on every call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollEnv {
    /// Logical canvas height
    pub canvas_height: f64,
    /// Fraction of the canvas height holding tracks
    pub render_region: f64,
    /// Sweep speed in pixels per second
    pub speed: f64,
    pub allow_overlap: bool,
    /// Resolved time origin in milliseconds
    pub origin_ms: i64,
    pub log_key_data: bool,
}

impl ScrollEnv {
    /// Horizontal distance the sweep has travelled at `now`
    pub fn translate_x(&self, now: i64) -> f64 {
        sweep_offset(now, self.origin_ms, self.speed)
    }
}

/// An equal-height horizontal lane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealTrack {
    /// 1-based position from the top
    pub id: usize,
    pub height: f64,
}

impl RealTrack {
    pub fn top(&self) -> f64 {
        (self.id - 1) as f64 * self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct QueueEntry {
    key: DanmakuKey,
    original_right: f64,
}

/// A contiguous run of `grade` real tracks with its queue of scrolling danmaku
#[derive(Debug, Clone)]
pub struct VirtualTrack {
    id: usize,
    first_real_track: usize,
    grade: usize,
    top: f64,
    queue: VecDeque<QueueEntry>,
}

impl VirtualTrack {
    fn new(id: usize, real_tracks: &[RealTrack]) -> Self {
        Self {
            id,
            first_real_track: real_tracks[0].id,
            grade: real_tracks.len(),
            top: real_tracks[0].top(),
            queue: VecDeque::new(),
        }
    }

    /// 1-based position among the virtual tracks of the same grade
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn grade(&self) -> usize {
        self.grade
    }

    /// Top of the first real track
    pub fn top(&self) -> f64 {
        self.top
    }

    /// Ids of the real tracks this virtual track spans
    pub fn real_track_ids(&self) -> RangeInclusive<usize> {
        self.first_real_track..=self.first_real_track + self.grade - 1
    }

    /// Keys queued on this track, oldest first
    pub fn members(&self) -> impl Iterator<Item = DanmakuKey> + '_ {
        self.queue.iter().map(|entry| entry.key)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether a danmaku starting at `original_left` can follow the last member
    pub fn accepts(&self, original_left: f64) -> bool {
        match self.queue.back() {
            None => true,
            Some(last) => last.original_right < original_left,
        }
    }

    fn push(&mut self, key: DanmakuKey, original_right: f64) {
        self.queue.push_back(QueueEntry {
            key,
            original_right,
        });
    }

    fn clear(&mut self) {
        self.queue.clear();
    }

    /// Drops members that left the screen; the last member always stays
    fn prune(&mut self, translate_x: f64) {
        while self.queue.len() > 1 {
            match self.queue.front() {
                Some(front) if front.original_right < translate_x => {
                    self.queue.pop_front();
                }
                _ => break,
            }
        }
    }
}

/// Statistical mode of `heights`, truncated to whole pixels.
///
/// Ties go to the value that reached the winning count first.
pub fn height_mode(heights: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    let mut best: Option<(f64, usize)> = None;
    for height in heights {
        let count = counts.entry(height.to_bits()).or_insert(0);
        *count += 1;
        match best {
            None => best = Some((height, 1)),
            Some((_, max)) if *count > max => best = Some((height, *count)),
            _ => {}
        }
    }
    best.map(|(height, _)| height.trunc())
}

/// Allocates scrolling danmaku onto virtual tracks
#[derive(Debug, Default)]
pub struct ScrollLayout {
    real_tracks: Vec<RealTrack>,
    /// Virtual tracks indexed by `grade - 1`, each list ordered top to bottom
    by_grade: Vec<Vec<VirtualTrack>>,
    track_height: f64,
}

impl ScrollLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether real and virtual tracks have been built
    pub fn is_initialized(&self) -> bool {
        !self.real_tracks.is_empty() && !self.by_grade.is_empty()
    }

    pub fn track_height(&self) -> f64 {
        self.track_height
    }

    pub fn real_tracks(&self) -> &[RealTrack] {
        &self.real_tracks
    }

    /// Virtual tracks of `grade`, topmost first; empty for grades without tracks
    pub fn virtual_tracks(&self, grade: usize) -> &[VirtualTrack] {
        grade
            .checked_sub(1)
            .and_then(|i| self.by_grade.get(i))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn virtual_track_count(&self) -> usize {
        self.by_grade.iter().map(Vec::len).sum()
    }

    /// Y coordinates of the boundaries between real tracks
    pub fn track_guides(&self) -> Vec<f64> {
        self.real_tracks.iter().skip(1).map(RealTrack::top).collect()
    }

    /// Discards all track state; the next layout pass rebuilds it
    pub fn reset_tracks(&mut self) {
        self.real_tracks.clear();
        self.by_grade.clear();
        self.track_height = 0.0;
    }

    /// Number of real tracks a danmaku of `height` spans, at least one
    pub fn grade_for(&self, height: f64) -> usize {
        if self.track_height <= 0.0 {
            return 1;
        }
        ((height / self.track_height).ceil() as usize).max(1)
    }

    fn init_tracks(&mut self, track_height: f64, env: &ScrollEnv) {
        self.reset_tracks();
        let count = (env.canvas_height * env.render_region / track_height).floor();
        let count = if count.is_finite() && count > 0.0 {
            count as usize
        } else {
            0
        };
        self.track_height = track_height;
        self.real_tracks = (1..=count)
            .map(|id| RealTrack {
                id,
                height: track_height,
            })
            .collect();

        for grade in 1..=count {
            let tracks = self
                .real_tracks
                .windows(grade)
                .enumerate()
                .map(|(i, span)| VirtualTrack::new(i + 1, span))
                .collect();
            self.by_grade.push(tracks);
        }

        let summary = format!(
            "track height {}, {} real tracks, {} virtual tracks",
            track_height,
            self.real_tracks.len(),
            self.virtual_track_count()
        );
        if env.log_key_data {
            log::info!("{summary}");
        } else {
            log::debug!("{summary}");
        }
    }

    fn assign_grade(&self, danmaku: &mut Danmaku) {
        let grade = self.grade_for(danmaku.height);
        if let Some(state) = danmaku.scroll_mut() {
            state.grade = grade;
        }
    }

    /// Lays out a whole batch of scrolling danmaku, building tracks on first use.
    ///
    /// In non-overlap mode every queue is cleared first and danmaku are placed in
    /// the order given, so callers pass them sorted by submission time.
    pub fn layout(
        &mut self,
        store: &mut DanmakuStore,
        keys: &[DanmakuKey],
        env: &ScrollEnv,
        rng: &mut dyn RngCore,
    ) {
        if keys.is_empty() {
            return;
        }
        let started = Instant::now();

        if !self.is_initialized() {
            let heights = keys.iter().filter_map(|k| store.get(*k)).map(|d| d.height);
            let Some(mode) = height_mode(heights) else {
                return;
            };
            self.init_tracks(mode + TRACK_GAP, env);
        }

        for key in keys {
            if let Some(danmaku) = store.get_mut(*key) {
                self.assign_grade(danmaku);
            }
        }

        if env.allow_overlap {
            for key in keys {
                if let Some(danmaku) = store.get_mut(*key) {
                    self.place_randomly(danmaku, rng);
                }
            }
        } else {
            self.by_grade.iter_mut().flatten().for_each(VirtualTrack::clear);
            for key in keys {
                self.place(store, *key, rng);
            }
        }

        if env.log_key_data {
            log::info!(
                "scroll layout of {} danmaku took {:?}",
                keys.len(),
                started.elapsed()
            );
        }
    }

    /// Places one newly sent danmaku without disturbing existing placements
    pub fn send(
        &mut self,
        store: &mut DanmakuStore,
        key: DanmakuKey,
        env: &ScrollEnv,
        rng: &mut dyn RngCore,
    ) {
        let Some(danmaku) = store.get_mut(key) else {
            return;
        };
        if !self.is_initialized() {
            if let Some(mode) = height_mode([danmaku.height]) {
                self.init_tracks(mode + TRACK_GAP, env);
            }
        }
        self.assign_grade(danmaku);

        if env.allow_overlap {
            self.place_randomly(danmaku, rng);
        } else {
            self.place(store, key, rng);
        }
    }

    /// First-fit placement on the virtual tracks of the danmaku's grade.
    ///
    /// Priority danmaku that find no room get a random real track instead.
    fn place(&mut self, store: &mut DanmakuStore, key: DanmakuKey, rng: &mut dyn RngCore) {
        let Some(danmaku) = store.get_mut(key) else {
            return;
        };
        let Some((grade, left, right)) = danmaku
            .scroll()
            .map(|s| (s.grade, s.original_left, s.original_right))
        else {
            return;
        };

        let slot = grade
            .checked_sub(1)
            .and_then(|i| self.by_grade.get_mut(i))
            .and_then(|tracks| tracks.iter_mut().find(|t| t.accepts(left)));

        let placed = match slot {
            Some(track) => {
                track.push(key, right);
                danmaku.top = Some(track.top());
                true
            }
            None => false,
        };
        set_show(danmaku, placed);

        if !placed && danmaku.prior {
            self.place_randomly(danmaku, rng);
        }
    }

    fn place_randomly(&self, danmaku: &mut Danmaku, rng: &mut dyn RngCore) {
        let top = if self.real_tracks.is_empty() {
            0.0
        } else {
            self.real_tracks[rng.random_range(0..self.real_tracks.len())].top()
        };
        danmaku.top = Some(top);
        set_show(danmaku, true);
    }

    /// Danmaku to draw at `now`, with `left` moved along the sweep.
    ///
    /// Danmaku that have completely left the screen are moved from `keys` to `expired`.
    pub fn visible(
        &mut self,
        store: &mut DanmakuStore,
        keys: &mut Vec<DanmakuKey>,
        expired: &mut Vec<DanmakuKey>,
        now: i64,
        env: &ScrollEnv,
    ) -> Vec<DanmakuKey> {
        let translate_x = env.translate_x(now);
        let mut render = Vec::new();

        keys.retain(|key| {
            let Some(danmaku) = store.get_mut(*key) else {
                return false;
            };
            let Some((show, left, right)) = danmaku
                .scroll()
                .map(|s| (s.show, s.original_left, s.original_right))
            else {
                expired.push(*key);
                return false;
            };
            if right - translate_x < 0.0 {
                expired.push(*key);
                return false;
            }
            if show && danmaku.top.is_some() {
                danmaku.left = left - translate_x;
                render.push(*key);
            }
            true
        });

        for track in self.by_grade.iter_mut().flatten() {
            track.prune(translate_x);
        }
        render
    }
}

fn set_show(danmaku: &mut Danmaku, show: bool) {
    if let Some(state) = danmaku.scroll_mut() {
        state.show = show;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::danmaku::DanmakuType;
    use crate::testing::{rng, sized, store_built};

    fn env(canvas_height: f64) -> ScrollEnv {
        ScrollEnv {
            canvas_height,
            render_region: 1.0,
            speed: 100.0,
            allow_overlap: false,
            origin_ms: 0,
            log_key_data: false,
        }
    }

    fn scroll(
        store: &mut DanmakuStore,
        id: &str,
        time: i64,
        width: f64,
        height: f64,
        canvas_width: f64,
    ) -> DanmakuKey {
        let config = RenderConfig::default();
        store_built(
            store,
            sized(id, time, DanmakuType::Scroll, width, height),
            &config,
            canvas_width,
        )
    }

    #[test]
    fn test_height_mode() {
        assert_eq!(height_mode([30.0, 30.0, 20.0]), Some(30.0));
        assert_eq!(height_mode([20.0, 30.0]), Some(20.0));
        assert_eq!(height_mode([20.0, 30.0, 30.0, 20.0]), Some(30.0));
        assert_eq!(height_mode([26.7]), Some(26.0));
        assert_eq!(height_mode(Vec::<f64>::new()), None);
    }

    #[test]
    fn test_track_metrics_from_mode_height() {
        let mut store = DanmakuStore::new();
        let keys: Vec<_> = (0..5)
            .map(|i| scroll(&mut store, "d", i * 1000, 100.0, 30.0, 800.0))
            .collect();
        let mut layout = ScrollLayout::new();
        layout.layout(&mut store, &keys, &env(400.0), &mut rng());

        assert_eq!(layout.track_height(), 40.0);
        assert_eq!(layout.real_tracks().len(), 10);
        assert_eq!(layout.real_tracks()[3].top(), 120.0);
        assert_eq!(layout.track_guides().len(), 9);
    }

    #[test]
    fn test_virtual_track_enumeration() {
        let mut store = DanmakuStore::new();
        let key = scroll(&mut store, "d", 0, 100.0, 30.0, 800.0);
        let mut layout = ScrollLayout::new();
        layout.layout(&mut store, &[key], &env(400.0), &mut rng());

        let n = layout.real_tracks().len();
        for grade in 1..=n {
            let tracks = layout.virtual_tracks(grade);
            assert_eq!(tracks.len(), n - grade + 1);
            for (i, track) in tracks.iter().enumerate() {
                assert_eq!(track.grade(), grade);
                assert_eq!(track.real_track_ids(), (i + 1)..=(i + grade));
                assert_eq!(track.top(), i as f64 * 40.0);
            }
        }
        assert!(layout.virtual_tracks(n + 1).is_empty());
        assert!(layout.virtual_tracks(0).is_empty());
        assert_eq!(layout.virtual_track_count(), n * (n + 1) / 2);
    }

    #[test]
    fn test_grade_law() {
        let mut layout = ScrollLayout::new();
        assert_eq!(layout.grade_for(100.0), 1);
        layout.init_tracks(40.0, &env(400.0));
        assert_eq!(layout.grade_for(1.0), 1);
        assert_eq!(layout.grade_for(40.0), 1);
        assert_eq!(layout.grade_for(40.5), 2);
        assert_eq!(layout.grade_for(0.0), 1);
        assert_eq!(layout.grade_for(121.0), 4);
    }

    #[test]
    fn test_second_danmaku_does_not_join_occupied_track() {
        let mut store = DanmakuStore::new();
        // original_left 500 and 550 on a 500px wide canvas at 100px/s
        let first = scroll(&mut store, "a", 0, 100.0, 30.0, 500.0);
        let second = scroll(&mut store, "b", 500, 100.0, 30.0, 500.0);
        assert_eq!(store.get(second).unwrap().scroll().unwrap().original_left, 550.0);

        let mut layout = ScrollLayout::new();
        layout.layout(&mut store, &[first, second], &env(400.0), &mut rng());

        let tracks = layout.virtual_tracks(1);
        assert_eq!(tracks[0].members().collect::<Vec<_>>(), vec![first]);
        assert_eq!(tracks[1].members().collect::<Vec<_>>(), vec![second]);
        assert_eq!(store.get(first).unwrap().top, Some(0.0));
        assert_eq!(store.get(second).unwrap().top, Some(40.0));
    }

    #[test]
    fn test_track_reused_once_previous_member_has_entered() {
        let mut store = DanmakuStore::new();
        let first = scroll(&mut store, "a", 0, 100.0, 30.0, 500.0);
        // original_left 601 > original_right 600
        let second = scroll(&mut store, "b", 1010, 100.0, 30.0, 500.0);
        let mut layout = ScrollLayout::new();
        layout.layout(&mut store, &[first, second], &env(400.0), &mut rng());
        assert_eq!(
            layout.virtual_tracks(1)[0].members().collect::<Vec<_>>(),
            vec![first, second]
        );
    }

    #[test]
    fn test_non_priority_dropped_when_full_and_priority_forced() {
        let mut store = DanmakuStore::new();
        // One real track: 60 / (30 + 10)
        let first = scroll(&mut store, "a", 0, 100.0, 30.0, 500.0);
        let dropped = scroll(&mut store, "b", 10, 100.0, 30.0, 500.0);
        let config = RenderConfig::default();
        let forced = store_built(
            &mut store,
            sized("c", 20, DanmakuType::Scroll, 100.0, 30.0).prior(),
            &config,
            500.0,
        );

        let mut layout = ScrollLayout::new();
        layout.layout(&mut store, &[first, dropped, forced], &env(60.0), &mut rng());
        assert_eq!(layout.real_tracks().len(), 1);

        let dropped = store.get(dropped).unwrap();
        assert!(!dropped.scroll().unwrap().show);
        let forced = store.get(forced).unwrap();
        assert!(forced.scroll().unwrap().show);
        assert_eq!(forced.top, Some(0.0));
    }

    #[test]
    fn test_tall_danmaku_uses_higher_grade() {
        let mut store = DanmakuStore::new();
        let small = scroll(&mut store, "a", 0, 100.0, 30.0, 500.0);
        let small2 = scroll(&mut store, "b", 0, 100.0, 30.0, 500.0);
        let tall = scroll(&mut store, "c", 0, 100.0, 70.0, 500.0);

        let mut layout = ScrollLayout::new();
        layout.layout(&mut store, &[small, small2, tall], &env(400.0), &mut rng());

        let tall = store.get(tall).unwrap();
        assert_eq!(tall.scroll().unwrap().grade, 2);
        assert_eq!(tall.top, Some(0.0));
        assert_eq!(layout.virtual_tracks(2)[0].members().count(), 1);
    }

    #[test]
    fn test_overlap_mode_places_everything_on_real_tracks() {
        let mut store = DanmakuStore::new();
        let keys: Vec<_> = (0..20)
            .map(|i| scroll(&mut store, "d", i, 100.0, 30.0, 500.0))
            .collect();
        let mut layout = ScrollLayout::new();
        let env = ScrollEnv {
            allow_overlap: true,
            ..env(400.0)
        };
        layout.layout(&mut store, &keys, &env, &mut rng());

        let tops: Vec<f64> = layout.real_tracks().iter().map(RealTrack::top).collect();
        for key in keys {
            let d = store.get(key).unwrap();
            assert!(d.scroll().unwrap().show);
            assert!(tops.contains(&d.top.unwrap()));
        }
        assert!(layout.virtual_tracks(1).iter().all(VirtualTrack::is_empty));
    }

    #[test]
    fn test_visible_moves_and_collects_expired() {
        let mut store = DanmakuStore::new();
        let first = scroll(&mut store, "a", 0, 100.0, 30.0, 500.0);
        let second = scroll(&mut store, "b", 3_000, 100.0, 30.0, 500.0);
        let mut keys = vec![first, second];
        let mut layout = ScrollLayout::new();
        layout.layout(&mut store, &keys, &env(400.0), &mut rng());

        let render = layout.visible(&mut store, &mut keys, &mut Vec::new(), 2_000, &env(400.0));
        assert_eq!(render, vec![first, second]);
        assert_eq!(store.get(first).unwrap().left, 300.0);
        assert_eq!(store.get(second).unwrap().left, 600.0);

        // first: original_right 600 - 700 < 0
        let render = layout.visible(&mut store, &mut keys, &mut Vec::new(), 7_000, &env(400.0));
        assert_eq!(render, vec![second]);
        assert_eq!(keys, vec![second]);
    }

    #[test]
    fn test_hidden_danmaku_is_tracked_but_not_rendered() {
        let mut store = DanmakuStore::new();
        let first = scroll(&mut store, "a", 0, 100.0, 30.0, 500.0);
        let hidden = scroll(&mut store, "b", 0, 100.0, 30.0, 500.0);
        let mut keys = vec![first, hidden];
        let mut layout = ScrollLayout::new();
        layout.layout(&mut store, &keys, &env(60.0), &mut rng());

        let render = layout.visible(&mut store, &mut keys, &mut Vec::new(), 0, &env(60.0));
        assert_eq!(render, vec![first]);
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_send_before_layout_builds_tracks() {
        let mut store = DanmakuStore::new();
        let key = scroll(&mut store, "a", 0, 100.0, 30.0, 500.0);
        let mut layout = ScrollLayout::new();
        layout.send(&mut store, key, &env(400.0), &mut rng());

        assert!(layout.is_initialized());
        assert_eq!(layout.track_height(), 40.0);
        assert_eq!(store.get(key).unwrap().top, Some(0.0));
    }

    #[test]
    fn test_send_appends_without_clearing_queues() {
        let mut store = DanmakuStore::new();
        let first = scroll(&mut store, "a", 0, 100.0, 30.0, 500.0);
        let mut layout = ScrollLayout::new();
        layout.layout(&mut store, &[first], &env(400.0), &mut rng());

        let sent = scroll(&mut store, "b", 100, 100.0, 30.0, 500.0);
        layout.send(&mut store, sent, &env(400.0), &mut rng());
        assert_eq!(store.get(sent).unwrap().top, Some(40.0));
        assert_eq!(layout.virtual_tracks(1)[0].members().count(), 1);
    }

    #[test]
    fn test_reset_then_layout_rebuilds_same_geometry() {
        let mut store = DanmakuStore::new();
        let keys: Vec<_> = (0..6)
            .map(|i| scroll(&mut store, "d", i * 100, 100.0, 30.0, 500.0))
            .collect();
        let mut layout = ScrollLayout::new();
        layout.layout(&mut store, &keys, &env(400.0), &mut rng());
        let before: Vec<_> = keys.iter().map(|k| store.get(*k).unwrap().top).collect();

        layout.reset_tracks();
        assert!(!layout.is_initialized());
        layout.layout(&mut store, &keys, &env(400.0), &mut rng());
        let after: Vec<_> = keys.iter().map(|k| store.get(*k).unwrap().top).collect();

        assert_eq!(before, after);
        assert_eq!(layout.real_tracks().len(), 10);
    }

    #[test]
    fn test_prune_keeps_last_member() {
        let mut store = DanmakuStore::new();
        let first = scroll(&mut store, "a", 0, 100.0, 30.0, 500.0);
        let second = scroll(&mut store, "b", 1_500, 100.0, 30.0, 500.0);
        let mut keys = vec![first, second];
        let mut layout = ScrollLayout::new();
        layout.layout(&mut store, &keys, &env(400.0), &mut rng());
        assert_eq!(layout.virtual_tracks(1)[0].members().count(), 2);

        layout.visible(&mut store, &mut keys, &mut Vec::new(), 6_100, &env(400.0));
        assert_eq!(
            layout.virtual_tracks(1)[0].members().collect::<Vec<_>>(),
            vec![second]
        );

        layout.visible(&mut store, &mut keys, &mut Vec::new(), 60_000, &env(400.0));
        assert_eq!(layout.virtual_tracks(1)[0].members().count(), 1);
        assert!(keys.is_empty());
    }
}
