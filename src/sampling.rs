//! Page sampling for wanted lists that are too large to fetch every run.
//!
//! Small lists are fetched in full. Larger ones get a few pages drawn
//! uniformly at random each run, so repeated scheduled runs eventually cover
//! the whole library instead of always seeing the head of the list.

use std::collections::BTreeSet;

use rand::Rng;

use crate::config::SamplingConfig;

/// Pages chosen for one instance/kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    /// 1-based pages whose records are processed this run.
    pub pages: BTreeSet<u32>,
    /// Selected pages the caller does not already hold.
    pub to_fetch: Vec<u32>,
    /// True when every page of the list was selected.
    pub exhaustive: bool,
}

impl PageSelection {
    fn empty() -> Self {
        Self {
            pages: BTreeSet::new(),
            to_fetch: Vec::new(),
            exhaustive: true,
        }
    }
}

/// Page selector with an injectable random source.
pub struct PageSampler<R: Rng> {
    rng: R,
    full_fetch_max_pages: u32,
    sample_pages: u32,
}

impl<R: Rng> PageSampler<R> {
    pub fn new(rng: R, config: &SamplingConfig) -> Self {
        Self {
            rng,
            full_fetch_max_pages: config.full_fetch_max_pages.max(1),
            sample_pages: config.sample_pages.max(1),
        }
    }

    pub fn total_pages(total_count: u64, page_size: u32) -> u32 {
        if page_size == 0 {
            return 0;
        }
        u32::try_from(total_count.div_ceil(u64::from(page_size))).unwrap_or(u32::MAX)
    }

    /// Chooses pages for a list of `total_count` items. Pages
    /// `1..=already_known_page_count` are already held by the caller and are
    /// left out of [`PageSelection::to_fetch`].
    pub fn select_pages(
        &mut self,
        total_count: u64,
        page_size: u32,
        already_known_page_count: u32,
    ) -> PageSelection {
        let total_pages = Self::total_pages(total_count, page_size);
        if total_pages == 0 {
            return PageSelection::empty();
        }

        let exhaustive = total_pages <= self.full_fetch_max_pages;
        let pages: BTreeSet<u32> = if exhaustive {
            (1..=total_pages).collect()
        } else {
            let amount = self.sample_pages.min(total_pages) as usize;
            rand::seq::index::sample(&mut self.rng, total_pages as usize, amount)
                .into_iter()
                .map(|index| index as u32 + 1)
                .collect()
        };
        let to_fetch = pages
            .iter()
            .copied()
            .filter(|page| *page > already_known_page_count)
            .collect();
        PageSelection {
            pages,
            to_fetch,
            exhaustive,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::PageSampler;
    use crate::config::SamplingConfig;

    fn sampler(seed: u64, full_fetch_max_pages: u32, sample_pages: u32) -> PageSampler<StdRng> {
        PageSampler::new(
            StdRng::seed_from_u64(seed),
            &SamplingConfig {
                page_size: 100,
                full_fetch_max_pages,
                sample_pages,
            },
        )
    }

    #[test]
    fn test_empty_list_selects_nothing() {
        let selection = sampler(1, 3, 1).select_pages(0, 100, 1);
        assert!(selection.pages.is_empty());
        assert!(selection.to_fetch.is_empty());
    }

    #[test]
    fn test_small_list_is_fetched_in_full_deterministically() {
        let mut sampler = sampler(7, 3, 1);
        let selection = sampler.select_pages(300, 100, 1);
        assert!(selection.exhaustive);
        assert_eq!(selection.pages, BTreeSet::from([1, 2, 3]));
        assert_eq!(selection.to_fetch, vec![2, 3]);

        let single = sampler.select_pages(5, 100, 1);
        assert_eq!(single.pages, BTreeSet::from([1]));
        assert!(single.to_fetch.is_empty());
    }

    #[test]
    fn test_large_list_is_sampled_within_range() {
        let mut sampler = sampler(11, 3, 2);
        for _ in 0..200 {
            let selection = sampler.select_pages(301, 100, 1);
            assert!(!selection.exhaustive);
            assert_eq!(selection.pages.len(), 2);
            assert!(selection.pages.iter().all(|page| (1..=4).contains(page)));
            assert!(selection.to_fetch.iter().all(|page| *page > 1));
        }
    }

    #[test]
    fn test_sample_count_is_capped_by_total_pages() {
        let selection = sampler(3, 1, 10).select_pages(250, 100, 0);
        assert_eq!(selection.pages, BTreeSet::from([1, 2, 3]));
        assert_eq!(selection.to_fetch, vec![1, 2, 3]);
    }

    #[test]
    fn test_repeated_runs_cover_every_page() {
        let mut sampler = sampler(42, 3, 1);
        let mut seen = BTreeSet::new();
        for _ in 0..500 {
            seen.extend(sampler.select_pages(2_000, 100, 1).pages);
        }
        assert_eq!(seen, (1..=20).collect::<BTreeSet<u32>>());
    }

    #[test]
    fn test_same_seed_gives_same_selection() {
        let first = sampler(99, 3, 3).select_pages(10_000, 100, 1);
        let second = sampler(99, 3, 3).select_pages(10_000, 100, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(PageSampler::<StdRng>::total_pages(0, 100), 0);
        assert_eq!(PageSampler::<StdRng>::total_pages(1, 100), 1);
        assert_eq!(PageSampler::<StdRng>::total_pages(100, 100), 1);
        assert_eq!(PageSampler::<StdRng>::total_pages(101, 100), 2);
        assert_eq!(PageSampler::<StdRng>::total_pages(10, 0), 0);
    }
}
