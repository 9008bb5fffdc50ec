//! One page load: wires the guard, resolver, controller, watcher and
//! scheduler together around an explicit session context.

use std::time::Duration;

use crate::{
    codec::Codec,
    config::SyncConfig,
    redirect::{GuardOutcome, RedirectRule, RedirectSurvivalGuard},
    resolver::StateResolver,
    schedule::{Clock, Scheduler, Task},
    share::{anchor_target, ShareLinks, ViewMode},
    storage::{StorageTiers, Tier},
    tree::{ApplyReport, Published, TreeDom, TreeStateController},
    watcher::{UrlChangeWatcher, WatchEvent},
};

/// Delay before scrolling to a `node=` anchor, so layout has settled
pub const ANCHOR_REVEAL_DELAY: Duration = Duration::from_millis(500);
/// How long the anchor highlight stays on
pub const HIGHLIGHT_DURATION: Duration = Duration::from_millis(2000);
/// Delay before the first share URL is published
pub const SHARE_REFRESH_DELAY: Duration = Duration::from_millis(600);

/// Per-load state that the browser version kept in page globals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub initial_load_complete: bool,
    pub public_base_url: Option<String>,
    pub share_url: Option<String>,
    pub view_mode: ViewMode,
    /// Tier the loaded state came from, `None` if fully expanded
    pub resolved_from: Option<Tier>,
    pub guard_outcome: Option<GuardOutcome>,
    pub apply_report: ApplyReport,
}

/// What one [`PageSession::tick`] did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub url_change: Option<WatchEvent>,
    pub tasks: Vec<Task>,
}

pub struct PageSession<D: TreeDom, C: Clock> {
    tiers: StorageTiers,
    dom: D,
    clock: C,
    guard: RedirectSurvivalGuard,
    resolver: StateResolver,
    controller: TreeStateController,
    watcher: UrlChangeWatcher,
    scheduler: Scheduler,
    links: ShareLinks,
    context: SessionContext,
}

impl<D: TreeDom, C: Clock> PageSession<D, C> {
    pub fn new(config: &SyncConfig, tiers: StorageTiers, dom: D, clock: C) -> Self {
        let codec = Codec::new(config.tag_policy);
        let guard = RedirectSurvivalGuard::new(RedirectRule::from_config(config));
        PageSession {
            tiers,
            dom,
            clock,
            watcher: UrlChangeWatcher::new(config.poll_interval(), guard.clone()),
            guard,
            resolver: StateResolver::new(codec),
            controller: TreeStateController::new(codec),
            scheduler: Scheduler::new(),
            links: ShareLinks::new(config.public_url.clone()),
            context: SessionContext::default(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn tiers(&self) -> &StorageTiers {
        &self.tiers
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn into_dom(self) -> D {
        self.dom
    }

    /// Run the load sequence. Resolution happens after the guard so a
    /// restored query token is visible to it.
    pub fn load(&mut self) -> &SessionContext {
        let now = self.clock.now();
        self.scheduler.clear();
        self.context = SessionContext {
            public_base_url: self.links.public_base().map(str::to_string),
            ..SessionContext::default()
        };

        let outcome = self.guard.run(&self.tiers);
        tracing::debug!("Redirect guard: {:?}", outcome);
        self.context.guard_outcome = Some(outcome);

        self.watcher.baseline(&self.tiers, now);

        let href = self.tiers.href();
        self.context.view_mode = ViewMode::from_url(&href).unwrap_or_default();

        let resolution = self.resolver.resolve(&self.tiers);
        self.context.resolved_from = resolution.tier;
        self.context.apply_report = self.controller.apply(&mut self.dom, &resolution.map);
        if !resolution.map.is_empty() {
            self.tiers
                .write_local_dense(&self.controller.extract(&self.dom));
        }

        if let Some(node) = anchor_target(&href) {
            self.scheduler
                .schedule(now, ANCHOR_REVEAL_DELAY, Task::RevealAnchor(node));
        }
        self.scheduler
            .schedule(now, SHARE_REFRESH_DELAY, Task::RefreshShareUrl);

        self.context.initial_load_complete = true;
        tracing::info!(
            "Loaded tree state from {}",
            resolution
                .tier
                .map_or_else(|| "nowhere".to_string(), |tier| tier.to_string())
        );
        &self.context
    }

    /// User clicked the control targeting `target`
    pub fn toggle(&mut self, target: &str) -> Option<Published> {
        let published = self.controller.toggle(&mut self.dom, &self.tiers, target)?;
        self.after_publish(&published);
        Some(published)
    }

    /// History navigation: re-apply the fragment's state, if it has one.
    /// Returns true when something was applied.
    pub fn popstate(&mut self) -> bool {
        let map = self.resolver.resolve_hash(&self.tiers);
        self.watcher.acknowledge(&self.tiers);
        if map.is_empty() {
            return false;
        }
        self.controller.apply(&mut self.dom, &map);
        true
    }

    /// Advance to the clock's current time: poll the URL and run due tasks
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let url_change = self.watcher.tick(
            now,
            &self.tiers,
            &self.resolver,
            &self.controller,
            &mut self.dom,
        );

        let tasks = self.scheduler.take_due(now);
        for task in &tasks {
            self.run_task(now, task);
        }

        TickReport { url_change, tasks }
    }

    /// Share link for the current state, publishing nothing
    pub fn share_url(&self) -> String {
        let token = self.controller.codec().encode(&self.controller.extract(&self.dom));
        self.links
            .share_url(&self.tiers.href(), &token, self.context.view_mode)
    }

    /// Link that reopens this state scrolled to `node`
    pub fn anchor_url(&self, node: &str) -> String {
        let token = self.controller.codec().encode(&self.controller.extract(&self.dom));
        self.links.anchor_url(&self.tiers.href(), &token, node)
    }

    fn run_task(&mut self, now: Duration, task: &Task) {
        match task {
            Task::RevealAnchor(node) => {
                if self.dom.scroll_into_view(node) {
                    self.dom.set_highlighted(node, true);
                    self.scheduler.schedule(
                        now,
                        HIGHLIGHT_DURATION,
                        Task::ClearHighlight(node.clone()),
                    );
                } else {
                    tracing::debug!("Anchor target {} not in document", node);
                }
            }
            Task::ClearHighlight(node) => self.dom.set_highlighted(node, false),
            Task::RefreshShareUrl => {
                let published = self.controller.publish(&self.dom, &self.tiers);
                self.after_publish(&published);
            }
        }
    }

    fn after_publish(&mut self, published: &Published) {
        // Our own URL write is not an out-of-band change
        self.watcher.acknowledge(&self.tiers);
        self.context.share_url = Some(self.links.share_url(
            &self.tiers.href(),
            &published.token,
            self.context.view_mode,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::encode,
        document::{OutlineNode, TreeDocument},
        schedule::ManualClock,
        state::StateMap,
        storage::{Location, MemoryStore, SimulatedLocation},
    };

    fn outline() -> Vec<OutlineNode> {
        vec![OutlineNode::new(
            "root",
            vec![
                OutlineNode::new("node-abc", vec![OutlineNode::leaf("leaf-1")]),
                OutlineNode::new("node-xyz", vec![OutlineNode::leaf("leaf-2")]),
            ],
        )]
    }

    fn session_at(
        url: &str,
        config: &SyncConfig,
    ) -> (
        PageSession<TreeDocument, ManualClock>,
        SimulatedLocation,
        ManualClock,
    ) {
        let location = SimulatedLocation::parse(url, None).unwrap();
        let tiers = StorageTiers::new(
            Box::new(location.clone()),
            Box::new(MemoryStore::session()),
            Box::new(MemoryStore::local()),
        );
        let clock = ManualClock::new();
        let page = PageSession::new(
            config,
            tiers,
            TreeDocument::from_outline(&outline()),
            clock.clone(),
        );
        (page, location, clock)
    }

    #[test]
    fn test_load_applies_hash_and_schedules_share_refresh() {
        let token = encode(&StateMap::collapsed(["node-abc-children"]));
        let (mut page, location, clock) = session_at(
            &format!("https://example.com/r.html#state={}&viewMode=monthly", token),
            &SyncConfig::default(),
        );

        let context = page.load().clone();
        assert!(context.initial_load_complete);
        assert_eq!(context.resolved_from, Some(Tier::Hash));
        assert_eq!(context.view_mode, ViewMode::Monthly);
        assert_eq!(context.share_url, None);
        assert_eq!(
            page.dom().collapsed_ids(),
            vec!["node-abc-children".to_string()]
        );

        clock.advance(Duration::from_millis(600));
        let report = page.tick();
        assert_eq!(report.tasks, vec![Task::RefreshShareUrl]);
        assert_eq!(
            page.context().share_url.as_deref(),
            Some(format!("r.html#state={}&viewMode=monthly", token).as_str())
        );
        assert_eq!(location.href().fragment(), Some(format!("state={}", token).as_str()));
    }

    #[test]
    fn test_zero_poll_interval_still_ticks() {
        let config = SyncConfig {
            poll_interval_ms: 0,
            ..SyncConfig::default()
        };
        let (mut page, location, clock) = session_at("https://example.com/r.html", &config);
        page.load();

        clock.advance(Duration::from_millis(1));
        assert_eq!(page.tick().url_change, None);

        let token = encode(&StateMap::collapsed(["node-abc-children"]));
        location.navigate(
            url::Url::parse(&format!("https://example.com/r.html#state={}", token)).unwrap(),
            None,
        );
        clock.advance(Duration::from_millis(1));
        assert!(page.tick().url_change.is_some());
        assert_eq!(
            page.dom().collapsed_ids(),
            vec!["node-abc-children".to_string()]
        );
    }

    #[test]
    fn test_anchor_reveal_and_highlight_timing() {
        let (mut page, _, clock) = session_at(
            "https://example.com/r.html#node=leaf-2",
            &SyncConfig::default(),
        );
        page.load();

        clock.advance(Duration::from_millis(499));
        page.tick();
        assert_eq!(page.dom().scrolled_to(), None);

        clock.advance(Duration::from_millis(1));
        page.tick();
        assert_eq!(page.dom().scrolled_to(), Some("leaf-2"));
        assert!(page.dom().is_highlighted("leaf-2"));

        clock.advance(Duration::from_millis(1999));
        page.tick();
        assert!(page.dom().is_highlighted("leaf-2"));

        clock.advance(Duration::from_millis(1));
        page.tick();
        assert!(!page.dom().is_highlighted("leaf-2"));
    }

    #[test]
    fn test_toggle_updates_share_url_without_watcher_echo() {
        let config = SyncConfig {
            public_url: Some("https://reports.example.com/kpi.html".to_string()),
            ..SyncConfig::default()
        };
        let (mut page, _, clock) = session_at("https://example.com/r.html", &config);
        page.load();

        let published = page.toggle("node-xyz-children").unwrap();
        assert_eq!(
            page.context().share_url.as_deref(),
            Some(
                format!(
                    "https://reports.example.com/kpi.html#state={}&viewMode=daily",
                    published.token
                )
                .as_str()
            )
        );
        assert_eq!(page.share_url(), page.context().share_url.clone().unwrap());

        clock.advance(Duration::from_millis(500));
        assert_eq!(page.tick().url_change, None);
    }

    #[test]
    fn test_popstate_reapplies_previous_fragment() {
        let first = encode(&StateMap::collapsed(["root-children"]));
        let (mut page, location, _) = session_at(
            &format!("https://example.com/r.html#state={}", first),
            &SyncConfig::default(),
        );
        page.load();

        let second = encode(&StateMap::collapsed(["node-xyz-children"]));
        location.navigate(
            url::Url::parse(&format!("https://example.com/r.html#state={}", second)).unwrap(),
            None,
        );
        assert!(page.popstate());
        assert_eq!(
            page.dom().collapsed_ids(),
            vec!["node-xyz-children".to_string()]
        );

        location.back();
        assert!(page.popstate());
        assert_eq!(page.dom().collapsed_ids(), vec!["root-children".to_string()]);

        location.navigate(url::Url::parse("https://example.com/r.html").unwrap(), None);
        assert!(!page.popstate());
    }

    #[test]
    fn test_anchor_url_carries_current_state() {
        let (mut page, _, _) = session_at("https://example.com/dir/r.html", &SyncConfig::default());
        page.load();
        assert_eq!(page.anchor_url("leaf-1"), "r.html#node=leaf-1");

        let published = page.toggle("node-abc-children").unwrap();
        assert_eq!(
            page.anchor_url("leaf-1"),
            format!("r.html#state={}&node=leaf-1", published.token)
        );
    }
}
