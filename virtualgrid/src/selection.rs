use std::collections::HashSet;
use std::hash::Hash;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectionMode {
    /// At most one selected row; selecting replaces the selection.
    Single,
    #[default]
    Multi,
}

/// How much of a page is selected (drives the header checkbox).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSelection {
    None,
    Partial,
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectAllScope {
    /// Every row on the current page.
    Page,
    /// Every row in the (filtered) dataset.
    Dataset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectAllOutcome {
    /// Rows were selected; carries how many.
    Applied(usize),
    /// The dataset is not materialized (remote mode). The caller must resolve the request out of
    /// band, e.g. by asking its backend for every matching id.
    Requested,
}

/// The set of selected row ids plus the anchor used by shift-range selection.
///
/// Presence means selected; deselecting removes the id. Ids need not belong to a loaded row:
/// a selected id whose row is filtered out or on another page simply stays inert.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "K: serde::Serialize",
        deserialize = "K: serde::Deserialize<'de> + Hash + Eq"
    ))
)]
pub struct SelectionState<K> {
    selected: HashSet<K>,
    last_anchor: Option<K>,
}

impl<K: Hash + Eq> PartialEq for SelectionState<K> {
    fn eq(&self, other: &Self) -> bool {
        self.selected == other.selected && self.last_anchor == other.last_anchor
    }
}

impl<K: Hash + Eq> Eq for SelectionState<K> {}

impl<K> Default for SelectionState<K> {
    fn default() -> Self {
        Self {
            selected: HashSet::new(),
            last_anchor: None,
        }
    }
}

impl<K: Hash + Eq + Clone> SelectionState<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = K>) -> Self {
        Self {
            selected: ids.into_iter().collect(),
            last_anchor: None,
        }
    }

    pub fn is_selected(&self, id: &K) -> bool {
        self.selected.contains(id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.selected.iter()
    }

    /// The most recent non-range selection target.
    pub fn last_anchor(&self) -> Option<&K> {
        self.last_anchor.as_ref()
    }
}

/// Owns the selection and implements the selection gestures.
#[derive(Clone, Debug)]
pub struct SelectionManager<K> {
    state: SelectionState<K>,
    mode: SelectionMode,
}

impl<K: Hash + Eq + Clone> SelectionManager<K> {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            state: SelectionState::default(),
            mode,
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn state(&self) -> &SelectionState<K> {
        &self.state
    }

    pub fn replace(&mut self, state: SelectionState<K>) {
        self.state = state;
        if self.mode == SelectionMode::Single && self.state.selected.len() > 1 {
            let keep = self
                .state
                .last_anchor
                .clone()
                .filter(|a| self.state.selected.contains(a));
            self.state.selected.clear();
            self.state.selected.extend(keep);
        }
    }

    pub fn is_selected(&self, id: &K) -> bool {
        self.state.is_selected(id)
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn selected_ids(&self) -> Vec<K> {
        self.state.selected.iter().cloned().collect()
    }

    /// Flips membership of `id` and makes it the range anchor.
    pub fn toggle(&mut self, id: K) -> bool {
        let select = !self.state.selected.contains(&id);
        self.set_selected(id, select)
    }

    /// Selects or deselects `id` and makes it the range anchor. Returns whether anything changed.
    pub fn set_selected(&mut self, id: K, selected: bool) -> bool {
        self.state.last_anchor = Some(id.clone());
        if !selected {
            return self.state.selected.remove(&id);
        }
        match self.mode {
            SelectionMode::Multi => self.state.selected.insert(id),
            SelectionMode::Single => {
                if self.state.selected.len() == 1 && self.state.selected.contains(&id) {
                    return false;
                }
                self.state.selected.clear();
                self.state.selected.insert(id);
                true
            }
        }
    }

    /// Applies the anchor's current selected state to every row between `anchor` and `id`
    /// (inclusive) in `order`, so a shift-click can extend either a selection or a deselection.
    ///
    /// Falls back to [`Self::toggle`] when either id is missing from `order` or in single mode.
    /// The anchor is left unchanged.
    pub fn range_select(&mut self, id: K, anchor: &K, order: &[K]) -> bool {
        if self.mode == SelectionMode::Single {
            return self.toggle(id);
        }
        let (Some(a), Some(b)) = (
            order.iter().position(|k| k == anchor),
            order.iter().position(|k| *k == id),
        ) else {
            gtrace!("range anchor not in current order; toggling");
            return self.toggle(id);
        };

        let select = self.state.selected.contains(anchor);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut changed = false;
        for k in &order[lo..=hi] {
            changed |= if select {
                self.state.selected.insert(k.clone())
            } else {
                self.state.selected.remove(k)
            };
        }
        changed
    }

    /// Range-selects from the stored anchor, or toggles when there is none.
    pub fn extend_to(&mut self, id: K, order: &[K]) -> bool {
        match self.state.last_anchor.clone() {
            Some(anchor) => self.range_select(id, &anchor, order),
            None => self.toggle(id),
        }
    }

    /// Selects every id given. Ignored in single mode. Returns how many became selected.
    pub fn select_all_on_page(&mut self, page_ids: impl IntoIterator<Item = K>) -> usize {
        if self.mode == SelectionMode::Single {
            return 0;
        }
        page_ids
            .into_iter()
            .filter(|id| self.state.selected.insert(id.clone()))
            .count()
    }

    pub fn deselect_all_on_page<'a>(&mut self, page_ids: impl IntoIterator<Item = &'a K>) -> usize
    where
        K: 'a,
    {
        page_ids
            .into_iter()
            .filter(|id| self.state.selected.remove(*id))
            .count()
    }

    /// Header-checkbox gesture: deselects the page when it is fully selected, otherwise selects
    /// all of it.
    pub fn toggle_page(&mut self, page_ids: &[K]) -> bool {
        match self.page_status(page_ids) {
            PageSelection::All => self.deselect_all_on_page(page_ids) > 0,
            _ => self.select_all_on_page(page_ids.iter().cloned()) > 0,
        }
    }

    pub fn page_status(&self, page_ids: &[K]) -> PageSelection {
        let selected = page_ids.iter().filter(|id| self.is_selected(id)).count();
        if selected == 0 {
            PageSelection::None
        } else if selected == page_ids.len() {
            PageSelection::All
        } else {
            PageSelection::Partial
        }
    }

    /// Whether to offer "select all N rows": only when the whole page is selected, the dataset
    /// is larger than the page, and not every dataset row is selected yet. A partially selected
    /// page never prompts.
    pub fn select_all_prompt(&self, page_ids: &[K], dataset_rows: usize) -> bool {
        !page_ids.is_empty()
            && self.page_status(page_ids) == PageSelection::All
            && dataset_rows > page_ids.len()
            && self.state.len() < dataset_rows
    }

    /// Drops selected ids for which `known` returns false.
    pub fn retain(&mut self, mut known: impl FnMut(&K) -> bool) -> bool {
        let before = self.state.selected.len();
        self.state.selected.retain(|k| known(k));
        if let Some(anchor) = &self.state.last_anchor {
            if !known(anchor) {
                self.state.last_anchor = None;
            }
        }
        before != self.state.selected.len()
    }

    pub fn clear(&mut self) -> bool {
        self.state.last_anchor = None;
        if self.state.selected.is_empty() {
            return false;
        }
        self.state.selected.clear();
        true
    }
}
