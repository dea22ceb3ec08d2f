//! Hook bus: the `only`/`all`/`every` combinators external authorization
//! and observability hooks run through.

use crate::store::SubscriberRecord;

/// One installed hook. All methods have a default no-opinion/no-op
/// implementation so a hook only needs to implement the point it cares
/// about.
pub trait Hook: Send + Sync {
    /// Authorization check for a subscribe. `None` means "no opinion";
    /// the first hook to answer wins (`only` combinator).
    fn auth_subscribe(&self, _client_id: &str, _filter: &str) -> Option<bool> {
        None
    }

    /// Notification fired after a subscribe commits. Every installed hook
    /// runs; return values are ignored (`all` combinator).
    fn on_subscribed(&self, _client_id: &str, _filter: &str) {}

    /// Filters/re-weights the subscriber list for a matched filter before
    /// delivery. Hooks run in registration order, each seeing the previous
    /// hook's output (`every` combinator).
    fn filter_subscribers(&self, subscribers: Vec<SubscriberRecord>) -> Vec<SubscriberRecord> {
        subscribers
    }
}

/// The installed hook chain, built around three combinators; there is no
/// single generic "run a named hook" entry point because each combinator
/// has a genuinely different call shape.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookRegistry {
    pub fn new() -> HookRegistry {
        HookRegistry { hooks: Vec::new() }
    }

    pub fn register(&mut self, hook: Box<dyn Hook>) {
        self.hooks.push(hook);
    }

    /// `only`: first hook with an opinion wins; no installed hook (or none
    /// with an opinion) means "allowed" (`not_allowed` is an explicit
    /// denial, not the absence of a hook).
    pub fn auth_subscribe(&self, client_id: &str, filter: &str) -> bool {
        for hook in &self.hooks {
            if let Some(verdict) = hook.auth_subscribe(client_id, filter) {
                return verdict;
            }
        }
        true
    }

    /// `all`: runs every hook, ignoring any of their return values.
    pub fn on_subscribed(&self, client_id: &str, filter: &str) {
        for hook in &self.hooks {
            hook.on_subscribed(client_id, filter);
        }
    }

    /// `every`: threaded reduction over the candidate subscriber list.
    pub fn filter_subscribers(&self, subscribers: Vec<SubscriberRecord>) -> Vec<SubscriberRecord> {
        self.hooks
            .iter()
            .fold(subscribers, |acc, hook| hook.filter_subscribers(acc))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct DenyAll;
    impl Hook for DenyAll {
        fn auth_subscribe(&self, _client_id: &str, _filter: &str) -> Option<bool> {
            Some(false)
        }
    }

    struct DropEvenQos;
    impl Hook for DropEvenQos {
        fn filter_subscribers(&self, subscribers: Vec<SubscriberRecord>) -> Vec<SubscriberRecord> {
            subscribers.into_iter().filter(|s| s.qos.as_u8() % 2 == 1).collect()
        }
    }

    #[test]
    fn no_hooks_means_allowed() {
        let registry = HookRegistry::new();
        assert!(registry.auth_subscribe("c1", "a/b"));
    }

    #[test]
    fn first_opinionated_hook_wins() {
        let mut registry = HookRegistry::new();
        registry.register(Box::new(DenyAll));
        assert!(!registry.auth_subscribe("c1", "a/b"));
    }

    #[test]
    fn filter_subscribers_threads_through_every_hook() {
        use crate::store::Qos;

        let mut registry = HookRegistry::new();
        registry.register(Box::new(DropEvenQos));
        let subs = vec![
            SubscriberRecord { filter: "a".into(), client_id: "c1".into(), qos: Qos::AtMostOnce },
            SubscriberRecord { filter: "a".into(), client_id: "c2".into(), qos: Qos::AtLeastOnce },
        ];
        let out = registry.filter_subscribers(subs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].client_id, "c2");
    }
}
