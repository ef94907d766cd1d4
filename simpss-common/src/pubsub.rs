//! Publisher/Subscriber contract.
//!
//! Publishers fan records out to named subscribers, synchronously and in
//! registration order. A slow subscriber stalls its publisher; callers that
//! need isolation wrap subscribers in their own concurrency boundary.

use tracing::warn;

use crate::error::{Error, Result};
use crate::record::Record;

/// Something that accepts named subscribers and pushes records to them.
pub trait Publisher {
    /// Register a subscriber under `name`.
    ///
    /// Fails with [`Error::DuplicateName`] if `name` is already registered.
    fn add_subscriber(&mut self, subscriber: Box<dyn Subscriber>, name: &str) -> Result<()>;

    /// Unregister a subscriber. Unknown names are logged and ignored.
    fn remove_subscriber(&mut self, name: &str);

    /// Deliver `record` to every subscriber in registration order.
    fn publish(&mut self, record: &Record) -> PublishReport;
}

/// Something that registers with a publisher and receives its records.
pub trait Subscriber: Send {
    /// Set the name this subscriber registers under.
    fn set_name(&mut self, name: &str);

    /// The registration name.
    fn name(&self) -> &str;

    /// Register with `publisher` via [`Publisher::add_subscriber`].
    ///
    /// Fails with [`Error::NotConfigured`] if the subscriber has not finished
    /// its own setup.
    fn subscribe(self: Box<Self>, publisher: &mut dyn Publisher) -> Result<()>;

    /// Handle one record pushed by the publisher.
    fn receive(&mut self, record: &Record) -> Result<()>;
}

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// Subscribers that accepted the record.
    pub delivered: usize,
    /// Subscribers that failed, with their error.
    pub failures: Vec<(String, Error)>,
}

impl PublishReport {
    /// Total number of subscribers the record was pushed to.
    pub fn total(&self) -> usize {
        self.delivered + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered set of named subscribers.
///
/// Building block for [`Publisher`] implementations.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Vec<(String, Box<dyn Subscriber>)>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber, rejecting duplicate names.
    pub fn add(&mut self, name: &str, subscriber: Box<dyn Subscriber>) -> Result<()> {
        if self.contains(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        self.subscribers.push((name.to_string(), subscriber));
        Ok(())
    }

    /// Unregister a subscriber, returning it if it was present.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Subscriber>> {
        match self.subscribers.iter().position(|(n, _)| n == name) {
            Some(index) => Some(self.subscribers.remove(index).1),
            None => {
                warn!(subscriber = %name, "Trying to remove a subscriber that does not exist");
                None
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.subscribers.iter().any(|(n, _)| n == name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.subscribers.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Drop every subscriber.
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    /// Push `record` to each subscriber in turn.
    ///
    /// A failing subscriber does not prevent delivery to the ones after it.
    pub fn publish(&mut self, record: &Record) -> PublishReport {
        let mut report = PublishReport::default();

        for (name, subscriber) in &mut self.subscribers {
            match subscriber.receive(record) {
                Ok(()) => report.delivered += 1,
                Err(e) => report.failures.push((name.clone(), e)),
            }
        }

        report
    }
}

impl Publisher for SubscriberRegistry {
    fn add_subscriber(&mut self, subscriber: Box<dyn Subscriber>, name: &str) -> Result<()> {
        self.add(name, subscriber)
    }

    fn remove_subscriber(&mut self, name: &str) {
        self.remove(name);
    }

    fn publish(&mut self, record: &Record) -> PublishReport {
        SubscriberRegistry::publish(self, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Subscriber that stamps each receive with a shared sequence counter.
    struct SequenceSubscriber {
        name: String,
        counter: Arc<AtomicUsize>,
        log: Arc<Mutex<Vec<(String, usize, usize)>>>,
        fail: bool,
    }

    impl SequenceSubscriber {
        fn boxed(
            name: &str,
            counter: &Arc<AtomicUsize>,
            log: &Arc<Mutex<Vec<(String, usize, usize)>>>,
        ) -> Box<Self> {
            Box::new(Self {
                name: name.to_string(),
                counter: counter.clone(),
                log: log.clone(),
                fail: false,
            })
        }
    }

    impl Subscriber for SequenceSubscriber {
        fn set_name(&mut self, name: &str) {
            self.name = name.to_string();
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn subscribe(self: Box<Self>, publisher: &mut dyn Publisher) -> Result<()> {
            let name = self.name.clone();
            publisher.add_subscriber(self, &name)
        }

        fn receive(&mut self, _record: &Record) -> Result<()> {
            let start = self.counter.fetch_add(1, Ordering::SeqCst);
            let end = self.counter.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push((self.name.clone(), start, end));
            if self.fail {
                Err(Error::WriteFailed("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let counter = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();

        registry
            .add_subscriber(SequenceSubscriber::boxed("s1", &counter, &log), "s1")
            .unwrap();
        let err = registry
            .add_subscriber(SequenceSubscriber::boxed("s1", &counter, &log), "s1")
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateName(ref n) if n == "s1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut registry = SubscriberRegistry::new();
        registry.remove_subscriber("ghost");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_fan_out_is_sequential_in_registration_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();

        for name in ["s1", "s2", "s3"] {
            SequenceSubscriber::boxed(name, &counter, &log)
                .subscribe(&mut registry)
                .unwrap();
        }

        let report = registry.publish(&Record::new().with("id", 1));
        assert_eq!(report.delivered, 3);
        assert!(report.is_success());

        let log = log.lock().unwrap();
        let names: Vec<_> = log.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["s1", "s2", "s3"]);
        for pair in log.windows(2) {
            // previous subscriber finished before the next one started
            assert!(pair[0].2 < pair[1].1);
        }
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let counter = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();

        let mut failing = SequenceSubscriber::boxed("bad", &counter, &log);
        failing.fail = true;
        registry.add("bad", failing).unwrap();
        registry
            .add("good", SequenceSubscriber::boxed("good", &counter, &log))
            .unwrap();

        let report = registry.publish(&Record::new().with("id", 1));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.total(), 2);
        assert_eq!(report.failures[0].0, "bad");
    }

    #[test]
    fn test_remove_then_publish_skips_removed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();

        registry
            .add("s1", SequenceSubscriber::boxed("s1", &counter, &log))
            .unwrap();
        registry
            .add("s2", SequenceSubscriber::boxed("s2", &counter, &log))
            .unwrap();
        assert!(registry.remove("s1").is_some());

        registry.publish(&Record::new().with("id", 1));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["s2"]);
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
