//! Bounded lookback window.

/// The most recent `depth` items of a series.
///
/// An update pushes first, computes over up to `depth + 1` items, then
/// calls [`trim`](Self::trim); between updates the window never holds more
/// than `depth` items. A window is warm once it has seen `depth + 1` items.
#[derive(Debug, Clone, PartialEq)]
pub struct LookbackWindow<T> {
    depth: usize,
    items: Vec<T>,
}

impl<T> LookbackWindow<T> {
    pub fn new(depth: usize) -> Self {
        Self { depth, items: Vec::with_capacity(depth + 1) }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Drop items from the front until at most `depth` remain.
    pub fn trim(&mut self) {
        if self.items.len() > self.depth {
            let excess = self.items.len() - self.depth;
            self.items.drain(..excess);
        }
    }

    pub fn is_warm(&self) -> bool {
        self.items.len() > self.depth
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warms_after_depth_plus_one() {
        let mut w = LookbackWindow::new(3);
        for i in 0..3 {
            w.push(i);
            assert!(!w.is_warm());
        }
        w.push(3);
        assert!(w.is_warm());
        assert_eq!(w.len(), 4);
        w.trim();
        assert_eq!(w.as_slice(), &[1, 2, 3]);
        assert!(!w.is_warm());
    }

    #[test]
    fn trim_is_noop_below_depth() {
        let mut w = LookbackWindow::new(5);
        w.push(1.0);
        w.trim();
        assert_eq!(w.len(), 1);
        assert_eq!(w.last(), Some(&1.0));
    }
}
