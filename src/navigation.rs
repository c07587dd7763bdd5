//! Navigators and the per-page track navigation manager
//!
//! A navigator is an indirection from an abstract slot ("channel 3",
//! "the selected track", "send 2") to a concrete track. The manager owns
//! every navigator of a page in an arena addressed by [`NavigatorId`],
//! together with the bank offset, pin table and scroll-link policy.

use crate::host::{Host, TargetId};
use std::collections::HashMap;
use tracing::{debug, info};

/// Arena index of a navigator inside its page's manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NavigatorId(pub usize);

/// Navigator variants, one resolution rule each
#[derive(Debug, Clone, PartialEq)]
pub enum NavigatorKind {
    /// Resolves to nothing; zones without a navigator token bind here
    Global,
    /// Banked channel strip, optionally pinned to a captured track
    Channel {
        channel: usize,
        pinned: Option<TargetId>,
    },
    SelectedTrack,
    MasterTrack,
    FocusedFx,
    /// Send slot of the selected track
    Send { send: usize },
}

#[derive(Debug, Clone)]
pub struct Navigator {
    pub kind: NavigatorKind,
    pub fader_touched: bool,
    pub rotary_touched: bool,
}

impl Navigator {
    fn new(kind: NavigatorKind) -> Self {
        Self {
            kind,
            fader_touched: false,
            rotary_touched: false,
        }
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self.kind, NavigatorKind::Channel { pinned: Some(_), .. })
    }

    /// Send index for send navigators
    pub fn send_index(&self) -> Option<usize> {
        match self.kind {
            NavigatorKind::Send { send } => Some(send),
            _ => None,
        }
    }
}

/// Owns all navigators of a page plus banking state.
///
/// Invariant: `track_offset <= max(0, total_targets - channel_count)`.
#[derive(Debug, Clone)]
pub struct TrackNavigationManager {
    navigators: Vec<Navigator>,
    channels: Vec<NavigatorId>,
    /// Host track order, refreshed every tick
    tracks: Vec<TargetId>,
    /// `tracks` minus pinned targets
    bankable: Vec<TargetId>,
    /// Pinned target -> channel it is pinned on. Every unpinned channel
    /// above a pin shifts down one bankable position per pin.
    pin_bias: HashMap<TargetId, usize>,
    track_offset: usize,
    scroll_link: bool,
    scroll_link_channel: usize,
    selected: Option<TargetId>,
    global: NavigatorId,
    selected_track: NavigatorId,
    master_track: NavigatorId,
    focused_fx: NavigatorId,
}

impl Default for TrackNavigationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackNavigationManager {
    pub fn new() -> Self {
        let navigators = vec![
            Navigator::new(NavigatorKind::Global),
            Navigator::new(NavigatorKind::SelectedTrack),
            Navigator::new(NavigatorKind::MasterTrack),
            Navigator::new(NavigatorKind::FocusedFx),
        ];
        Self {
            navigators,
            channels: Vec::new(),
            tracks: Vec::new(),
            bankable: Vec::new(),
            pin_bias: HashMap::new(),
            track_offset: 0,
            scroll_link: false,
            scroll_link_channel: 0,
            selected: None,
            global: NavigatorId(0),
            selected_track: NavigatorId(1),
            master_track: NavigatorId(2),
            focused_fx: NavigatorId(3),
        }
    }

    fn push(&mut self, kind: NavigatorKind) -> NavigatorId {
        let id = NavigatorId(self.navigators.len());
        self.navigators.push(Navigator::new(kind));
        id
    }

    /// Append the next banked channel navigator (channels number across
    /// every surface on the page).
    pub fn add_channel_navigator(&mut self) -> NavigatorId {
        let channel = self.channels.len();
        let id = self.push(NavigatorKind::Channel {
            channel,
            pinned: None,
        });
        self.channels.push(id);
        self.clamp_offset();
        id
    }

    pub fn add_send_navigator(&mut self, send: usize) -> NavigatorId {
        self.push(NavigatorKind::Send { send })
    }

    pub fn global_navigator(&self) -> NavigatorId {
        self.global
    }

    pub fn selected_track_navigator(&self) -> NavigatorId {
        self.selected_track
    }

    pub fn master_track_navigator(&self) -> NavigatorId {
        self.master_track
    }

    pub fn focused_fx_navigator(&self) -> NavigatorId {
        self.focused_fx
    }

    pub fn navigator(&self, id: NavigatorId) -> Option<&Navigator> {
        self.navigators.get(id.0)
    }

    pub fn channel_navigators(&self) -> &[NavigatorId] {
        &self.channels
    }

    pub fn tracks(&self) -> &[TargetId] {
        &self.tracks
    }

    pub fn track_offset(&self) -> usize {
        self.track_offset
    }

    pub fn total_targets(&self) -> usize {
        self.tracks.len()
    }

    pub fn navigator_count(&self) -> usize {
        self.channels.len()
    }

    pub fn selected_track(&self) -> Option<&TargetId> {
        self.selected.as_ref()
    }

    pub fn scroll_link(&self) -> bool {
        self.scroll_link
    }

    pub fn set_scroll_link(&mut self, on: bool) {
        self.scroll_link = on;
    }

    pub fn toggle_scroll_link(&mut self) {
        self.scroll_link = !self.scroll_link;
        info!("🔗 Scroll link {}", if self.scroll_link { "on" } else { "off" });
    }

    /// Channel slot the selected track is scrolled to by [`Self::force_scroll_link`].
    pub fn set_scroll_link_channel(&mut self, channel: usize) {
        self.scroll_link_channel = channel;
    }

    fn max_offset(&self) -> usize {
        self.total_targets().saturating_sub(self.navigator_count())
    }

    fn clamp_offset(&mut self) {
        self.track_offset = self.track_offset.min(self.max_offset());
    }

    fn rebuild_bankable(&mut self) {
        self.bankable = self
            .tracks
            .iter()
            .filter(|t| !self.pin_bias.contains_key(*t))
            .cloned()
            .collect();
    }

    /// Refresh the track list and selection from the host.
    ///
    /// Returns `true` when the first selected track changed.
    pub fn sync(&mut self, host: &dyn Host) -> bool {
        let tracks: Vec<TargetId> = (0..host.track_count())
            .filter_map(|i| host.track_at(i))
            .collect();
        if tracks != self.tracks {
            debug!("Track list changed: {} tracks", tracks.len());
            self.tracks = tracks;
            self.rebuild_bankable();
            self.clamp_offset();
        }

        let selected = host.selected_tracks().into_iter().next();
        if selected != self.selected {
            self.selected = selected;
            return true;
        }
        false
    }

    /// Move the bank by `amount` channels, clamped to the valid offset range.
    pub fn adjust_bank(&mut self, amount: i32) {
        if self.total_targets() <= self.navigator_count() {
            return;
        }
        let max = self.max_offset() as i64;
        let offset = (self.track_offset as i64 + amount as i64).clamp(0, max);
        self.track_offset = offset as usize;
        debug!("Bank offset -> {}", self.track_offset);
    }

    fn channel_bias(&self, channel: usize) -> usize {
        self.pin_bias.values().filter(|&&c| c < channel).count()
    }

    /// Resolve a navigator to its current target.
    pub fn resolve(&self, id: NavigatorId, host: &dyn Host) -> Option<TargetId> {
        let navigator = self.navigator(id)?;
        let target = match &navigator.kind {
            NavigatorKind::Global => None,
            NavigatorKind::Channel {
                pinned: Some(target),
                ..
            } => Some(target.clone()),
            NavigatorKind::Channel {
                channel,
                pinned: None,
            } => {
                let index = channel - self.channel_bias(*channel) + self.track_offset;
                self.bankable.get(index).cloned()
            }
            NavigatorKind::SelectedTrack | NavigatorKind::Send { .. } => self.selected.clone(),
            NavigatorKind::MasterTrack => host.master_track(),
            NavigatorKind::FocusedFx => host.focused_fx().map(|(track, _)| track),
        };
        target.filter(|t| host.resolve(t))
    }

    /// Freeze a channel navigator on the track it currently shows.
    pub fn pin(&mut self, id: NavigatorId, host: &dyn Host) {
        let Some(target) = self.resolve(id, host) else {
            return;
        };
        let Some(Navigator {
            kind: NavigatorKind::Channel { channel, pinned },
            ..
        }) = self.navigators.get_mut(id.0)
        else {
            return;
        };
        if pinned.is_some() {
            return;
        }
        info!("📌 Pin {} on channel {}", target, *channel + 1);
        *pinned = Some(target.clone());
        let channel = *channel;
        self.pin_bias.insert(target, channel);
        self.rebuild_bankable();
        self.clamp_offset();
    }

    /// Release a pinned channel navigator back to banking.
    pub fn unpin(&mut self, id: NavigatorId) {
        let Some(Navigator {
            kind: NavigatorKind::Channel { pinned, .. },
            ..
        }) = self.navigators.get_mut(id.0)
        else {
            return;
        };
        if let Some(target) = pinned.take() {
            info!("📌 Unpin {}", target);
            self.pin_bias.remove(&target);
            self.rebuild_bankable();
            self.clamp_offset();
        }
    }

    pub fn toggle_pin(&mut self, id: NavigatorId, host: &dyn Host) {
        if self.navigator(id).is_some_and(Navigator::is_pinned) {
            self.unpin(id);
        } else {
            self.pin(id, host);
        }
    }

    pub fn set_fader_touch(&mut self, id: NavigatorId, touched: bool) {
        if let Some(nav) = self.navigators.get_mut(id.0) {
            nav.fader_touched = touched;
        }
    }

    pub fn set_rotary_touch(&mut self, id: NavigatorId, touched: bool) {
        if let Some(nav) = self.navigators.get_mut(id.0) {
            nav.rotary_touched = touched;
        }
    }

    /// Whether `target` is currently shown by some channel navigator.
    pub fn is_visible(&self, target: &TargetId, host: &dyn Host) -> bool {
        self.channels
            .iter()
            .any(|&id| self.resolve(id, host).as_ref() == Some(target))
    }

    /// Bring the selected track into view at the scroll-link channel.
    pub fn force_scroll_link(&mut self, host: &dyn Host) {
        let Some(selected) = self.selected.clone() else {
            return;
        };
        if self.is_visible(&selected, host) {
            return;
        }
        if let Some(index) = self.bankable.iter().position(|t| t == &selected) {
            self.track_offset = index.saturating_sub(self.scroll_link_channel);
            self.clamp_offset();
            debug!("Scroll link moved bank to {}", self.track_offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use proptest::prelude::*;

    fn manager(channels: usize, host: &MemoryHost) -> TrackNavigationManager {
        let mut nav = TrackNavigationManager::new();
        for _ in 0..channels {
            nav.add_channel_navigator();
        }
        nav.sync(host);
        nav
    }

    fn name(host: &MemoryHost, target: Option<TargetId>) -> Option<String> {
        target.and_then(|t| host.get_string(&t, crate::host::attr::NAME))
    }

    #[test]
    fn test_channel_resolution_follows_bank() {
        let host = MemoryHost::with_tracks(12);
        let mut nav = manager(8, &host);
        let ch0 = nav.channel_navigators()[0];
        assert_eq!(name(&host, nav.resolve(ch0, &host)).as_deref(), Some("Track 1"));

        nav.adjust_bank(3);
        assert_eq!(nav.track_offset(), 3);
        assert_eq!(name(&host, nav.resolve(ch0, &host)).as_deref(), Some("Track 4"));

        nav.adjust_bank(100);
        assert_eq!(nav.track_offset(), 4);
        nav.adjust_bank(-100);
        assert_eq!(nav.track_offset(), 0);
    }

    #[test]
    fn test_bank_noop_when_tracks_fit() {
        let host = MemoryHost::with_tracks(4);
        let mut nav = manager(8, &host);
        nav.adjust_bank(1);
        assert_eq!(nav.track_offset(), 0);
        let last = nav.channel_navigators()[7];
        assert_eq!(nav.resolve(last, &host), None);
    }

    #[test]
    fn test_pin_freezes_and_bias_skips_pinned() {
        let host = MemoryHost::with_tracks(12);
        let mut nav = manager(4, &host);
        let chans = nav.channel_navigators().to_vec();

        nav.pin(chans[1], &host);
        nav.adjust_bank(2);
        let shown: Vec<_> = chans
            .iter()
            .map(|&c| name(&host, nav.resolve(c, &host)).unwrap())
            .collect();
        assert_eq!(shown, ["Track 4", "Track 2", "Track 5", "Track 6"]);

        nav.unpin(chans[1]);
        let shown: Vec<_> = chans
            .iter()
            .map(|&c| name(&host, nav.resolve(c, &host)).unwrap())
            .collect();
        assert_eq!(shown, ["Track 3", "Track 4", "Track 5", "Track 6"]);
    }

    #[test]
    fn test_toggle_pin() {
        let host = MemoryHost::with_tracks(6);
        let mut nav = manager(2, &host);
        let ch = nav.channel_navigators()[0];
        nav.toggle_pin(ch, &host);
        assert!(nav.navigator(ch).unwrap().is_pinned());
        nav.toggle_pin(ch, &host);
        assert!(!nav.navigator(ch).unwrap().is_pinned());
    }

    #[test]
    fn test_selected_and_master() {
        let mut host = MemoryHost::with_tracks(5);
        let mut nav = manager(2, &host);
        let sel = nav.selected_track_navigator();
        assert_eq!(nav.resolve(sel, &host), None);
        assert_eq!(nav.resolve(nav.global_navigator(), &host), None);

        let t4 = host.track_at(3).unwrap();
        host.select_only(&t4);
        assert!(nav.sync(&host));
        assert!(!nav.sync(&host));
        assert_eq!(nav.resolve(sel, &host), Some(t4));
        assert_eq!(
            nav.resolve(nav.master_track_navigator(), &host),
            host.master_track()
        );
    }

    #[test]
    fn test_force_scroll_link() {
        let mut host = MemoryHost::with_tracks(20);
        let mut nav = manager(8, &host);
        nav.set_scroll_link_channel(2);

        let t = host.track_at(4).unwrap();
        host.select_only(&t);
        nav.sync(&host);
        nav.force_scroll_link(&host);
        assert_eq!(nav.track_offset(), 0, "already visible, no move");

        let t = host.track_at(15).unwrap();
        host.select_only(&t);
        nav.sync(&host);
        nav.force_scroll_link(&host);
        assert_eq!(nav.track_offset(), 12, "offset clamped to 20 - 8");

        let t = host.track_at(10).unwrap();
        host.select_only(&t);
        nav.sync(&host);
        nav.adjust_bank(-12);
        nav.force_scroll_link(&host);
        assert_eq!(nav.track_offset(), 8);
    }

    #[test]
    fn test_removed_track_clamps_offset() {
        let mut host = MemoryHost::with_tracks(10);
        let mut nav = manager(4, &host);
        nav.adjust_bank(6);
        for i in (6..10).rev() {
            let id = host.track_at(i).unwrap();
            host.remove_track(&id);
        }
        nav.sync(&host);
        assert_eq!(nav.track_offset(), 2);
    }

    proptest! {
        #[test]
        fn prop_bank_offset_always_in_range(
            tracks in 0usize..40,
            channels in 0usize..16,
            moves in proptest::collection::vec(any::<i32>(), 1..20),
        ) {
            let host = MemoryHost::with_tracks(tracks);
            let mut nav = manager(channels, &host);
            for m in moves {
                nav.adjust_bank(m);
                prop_assert!(nav.track_offset() <= tracks.saturating_sub(channels));
            }
        }
    }
}
