/*
 *
 * Copyright 2025 gRPC authors.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

//! Weighted random selection with integer weights.

use rand::Rng;

struct Entry<T> {
    item: T,
    weight: u64,
}

/// Picks among a fixed set of items with probability proportional to each
/// item's integer weight.  Selection is stateless: every call draws a fresh
/// random number, so the distribution depends only on the weights and not on
/// insertion order.
pub(crate) struct WeightedRandom<T> {
    entries: Vec<Entry<T>>,
    total_weight: u64,
}

impl<T> WeightedRandom<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            total_weight: 0,
        }
    }

    /// Adds an item with the given weight.  Items with zero weight are never
    /// selected.
    pub(crate) fn add(&mut self, item: T, weight: u64) {
        self.total_weight += weight;
        self.entries.push(Entry { item, weight });
    }

    /// Returns a randomly selected item, or `None` if the picker is empty or
    /// all weights are zero.
    pub(crate) fn next(&self) -> Option<&T> {
        if self.total_weight == 0 {
            return None;
        }
        let mut n = rand::thread_rng().gen_range(0..self.total_weight);
        for entry in &self.entries {
            if n < entry.weight {
                return Some(&entry.item);
            }
            n -= entry.weight;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_picker_returns_none() {
        let picker = WeightedRandom::<&str>::new();
        assert!(picker.next().is_none());
    }

    #[test]
    fn zero_weight_items_are_never_picked() {
        let mut picker = WeightedRandom::new();
        picker.add("never", 0);
        picker.add("always", 1);
        for _ in 0..100 {
            assert_eq!(picker.next(), Some(&"always"));
        }
    }

    #[test]
    fn single_item_is_always_picked() {
        let mut picker = WeightedRandom::new();
        picker.add("only", 3);
        assert_eq!(picker.next(), Some(&"only"));
    }

    // Draws a large number of picks and verifies the empirical distribution
    // converges to weight/total within a 5% absolute tolerance.
    #[test]
    fn distribution_follows_weights() {
        let mut picker = WeightedRandom::new();
        picker.add("a", 1);
        picker.add("b", 3);
        picker.add("c", 6);

        const N: usize = 50_000;
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for _ in 0..N {
            *counts.entry(*picker.next().unwrap()).or_default() += 1;
        }

        for (item, weight) in [("a", 1.0), ("b", 3.0), ("c", 6.0)] {
            let want = weight / 10.0;
            let got = *counts.get(item).unwrap() as f64 / N as f64;
            assert!(
                (got - want).abs() < 0.05,
                "item {item}: got fraction {got}, want {want}"
            );
        }
    }
}
