/// Receiver for coarse progress reports from the load and save adapters.
///
/// Scopes are strictly nested and every `begin_scope` is matched by one
/// `end_scope`, also when the operation fails. `weight` is the scope's
/// share of its parent, in percent.
pub trait ProgressIndicator {
    fn begin_scope(&mut self, name: &str, weight: u32);
    fn end_scope(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Begin { name: String, weight: u32 },
    End,
}

/// Indicator that records every event in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressLog {
    pub events: Vec<ProgressEvent>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the scopes opened so far.
    pub fn scope_names(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Begin { name, .. } => Some(name.as_str()),
                ProgressEvent::End => None,
            })
            .collect()
    }

    /// True when every opened scope was closed.
    pub fn is_balanced(&self) -> bool {
        let mut depth = 0i64;
        for event in &self.events {
            depth += match event {
                ProgressEvent::Begin { .. } => 1,
                ProgressEvent::End => -1,
            };
            if depth < 0 {
                return false;
            }
        }
        depth == 0
    }
}

impl ProgressIndicator for ProgressLog {
    fn begin_scope(&mut self, name: &str, weight: u32) {
        self.events.push(ProgressEvent::Begin {
            name: name.to_string(),
            weight,
        });
    }

    fn end_scope(&mut self) {
        self.events.push(ProgressEvent::End);
    }
}

/// Optional indicator borrowed for the duration of one adapter call.
pub(crate) struct Progress<'a> {
    inner: Option<&'a mut dyn ProgressIndicator>,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(inner: Option<&'a mut dyn ProgressIndicator>) -> Self {
        Self { inner }
    }

    /// Open a scope that closes when the guard is dropped.
    pub(crate) fn scope<'p>(&'p mut self, name: &str, weight: u32) -> Scope<'p, 'a> {
        if let Some(indicator) = self.inner.as_deref_mut() {
            indicator.begin_scope(name, weight);
        }
        Scope { progress: self }
    }
}

pub(crate) struct Scope<'p, 'a> {
    progress: &'p mut Progress<'a>,
}

impl Drop for Scope<'_, '_> {
    fn drop(&mut self) {
        if let Some(indicator) = self.progress.inner.as_deref_mut() {
            indicator.end_scope();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_close_on_drop() {
        let mut log = ProgressLog::new();
        {
            let mut progress = Progress::new(Some(&mut log));
            {
                let _outer = progress.scope("Loading file", 30);
            }
            let _second = progress.scope("Translating file", 70);
        }
        assert_eq!(
            log.events,
            vec![
                ProgressEvent::Begin {
                    name: "Loading file".into(),
                    weight: 30
                },
                ProgressEvent::End,
                ProgressEvent::Begin {
                    name: "Translating file".into(),
                    weight: 70
                },
                ProgressEvent::End,
            ]
        );
        assert!(log.is_balanced());
    }

    #[test]
    fn test_absent_indicator_is_silent() {
        let mut progress = Progress::new(None);
        let _scope = progress.scope("Writing file", 100);
    }

    #[test]
    fn test_unbalanced_log_detected() {
        let mut log = ProgressLog::new();
        log.begin_scope("a", 1);
        assert!(!log.is_balanced());
        log.end_scope();
        log.end_scope();
        assert!(!log.is_balanced());
    }
}
