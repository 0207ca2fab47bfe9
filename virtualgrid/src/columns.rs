use std::collections::BTreeMap;
use std::sync::Arc;

use crate::debounce::Debouncer;
use crate::error::PreferenceError;
use crate::ColumnId;

/// Static description of a column. Width, order and visibility live in [`ColumnLayoutState`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnDescriptor {
    pub id: ColumnId,
    pub min_width: u32,
    pub max_width: u32,
    pub default_width: u32,
    pub sortable: bool,
    pub filterable: bool,
}

impl ColumnDescriptor {
    pub fn new(id: impl Into<ColumnId>) -> Self {
        Self {
            id: id.into(),
            min_width: 20,
            max_width: u32::MAX,
            default_width: 150,
            sortable: true,
            filterable: true,
        }
    }

    pub fn with_width_bounds(mut self, min_width: u32, max_width: u32) -> Self {
        self.min_width = min_width;
        self.max_width = max_width.max(min_width);
        self
    }

    pub fn with_default_width(mut self, default_width: u32) -> Self {
        self.default_width = default_width;
        self
    }

    pub fn with_sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    pub fn with_filterable(mut self, filterable: bool) -> Self {
        self.filterable = filterable;
        self
    }

    pub fn clamp_width(&self, width: u32) -> u32 {
        width.clamp(self.min_width, self.max_width.max(self.min_width))
    }

    fn initial_width(&self) -> u32 {
        self.clamp_width(self.default_width)
    }
}

/// Mutable per-column layout: widths, display order and visibility.
///
/// This is also the shape handed to the preference store. A column missing from
/// `column_sizing` has its default width; one missing from `column_visibility` is visible.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnLayoutState {
    #[cfg_attr(feature = "serde", serde(default))]
    pub column_sizing: BTreeMap<ColumnId, u32>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub column_order: Vec<ColumnId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub column_visibility: BTreeMap<ColumnId, bool>,
}

/// Persisted column preferences.
pub type ColumnPreferences = ColumnLayoutState;

/// Which part of the layout an operation changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayoutChange {
    Sizing,
    Order,
    Visibility,
}

fn find<'a>(columns: &'a [ColumnDescriptor], id: &str) -> Option<&'a ColumnDescriptor> {
    columns.iter().find(|c| c.id == id)
}

impl ColumnLayoutState {
    /// Default layout: declaration order, default widths, everything visible.
    pub fn initial(columns: &[ColumnDescriptor]) -> Self {
        Self {
            column_sizing: BTreeMap::new(),
            column_order: columns.iter().map(|c| c.id.clone()).collect(),
            column_visibility: BTreeMap::new(),
        }
    }

    /// Returns a copy consistent with `columns`: unknown ids dropped, widths clamped, and
    /// columns missing from the order appended in declaration order.
    pub fn normalized(&self, columns: &[ColumnDescriptor]) -> Self {
        let column_sizing = self
            .column_sizing
            .iter()
            .filter_map(|(id, &w)| find(columns, id).map(|c| (id.clone(), c.clamp_width(w))))
            .collect();

        let mut column_order: Vec<ColumnId> = Vec::with_capacity(columns.len());
        for id in &self.column_order {
            if find(columns, id).is_some() && !column_order.contains(id) {
                column_order.push(id.clone());
            }
        }
        for c in columns {
            if !column_order.contains(&c.id) {
                column_order.push(c.id.clone());
            }
        }

        let column_visibility = self
            .column_visibility
            .iter()
            .filter(|(id, _)| find(columns, id).is_some())
            .map(|(id, &v)| (id.clone(), v))
            .collect();

        Self {
            column_sizing,
            column_order,
            column_visibility,
        }
    }

    pub fn width_of(&self, columns: &[ColumnDescriptor], id: &str) -> Option<u32> {
        let column = find(columns, id)?;
        Some(
            self.column_sizing
                .get(id)
                .map(|&w| column.clamp_width(w))
                .unwrap_or_else(|| column.initial_width()),
        )
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.column_visibility.get(id).copied().unwrap_or(true)
    }

    /// New width = `clamp(current + delta, min, max)`.
    pub fn resize(&mut self, columns: &[ColumnDescriptor], id: &str, delta_px: i64) -> bool {
        let (Some(column), Some(current)) = (find(columns, id), self.width_of(columns, id)) else {
            return false;
        };
        let target = (current as i64).saturating_add(delta_px).clamp(0, u32::MAX as i64) as u32;
        self.set_width(column, target)
    }

    /// Width = `clamp(max(measured) + padding, min, max)`.
    ///
    /// Under virtualization only rendered rows can be measured, so the result is only as good as
    /// what is on screen. An empty measurement list sizes the column to `padding`.
    pub fn auto_fit(
        &mut self,
        columns: &[ColumnDescriptor],
        id: &str,
        measured_widths: &[u32],
        padding: u32,
    ) -> bool {
        let Some(column) = find(columns, id) else {
            return false;
        };
        let widest = measured_widths.iter().copied().max().unwrap_or(0);
        self.set_width(column, widest.saturating_add(padding))
    }

    fn set_width(&mut self, column: &ColumnDescriptor, width: u32) -> bool {
        let width = column.clamp_width(width);
        if self.column_sizing.get(&column.id) == Some(&width) {
            return false;
        }
        self.column_sizing.insert(column.id.clone(), width);
        true
    }

    /// Moves `dragged` to the slot `target` occupies before the move.
    pub fn reorder(&mut self, dragged: &str, target: &str) -> bool {
        if dragged == target {
            return false;
        }
        let (Some(from), Some(to)) = (
            self.column_order.iter().position(|id| id == dragged),
            self.column_order.iter().position(|id| id == target),
        ) else {
            return false;
        };
        let id = self.column_order.remove(from);
        let to = to.min(self.column_order.len());
        self.column_order.insert(to, id);
        true
    }

    pub fn set_visibility(&mut self, columns: &[ColumnDescriptor], id: &str, visible: bool) -> bool {
        if find(columns, id).is_none() || self.is_visible(id) == visible {
            return false;
        }
        self.column_visibility.insert(id.to_owned(), visible);
        true
    }

    /// Ids of visible columns in display order.
    pub fn visible_ids(&self) -> impl Iterator<Item = &str> {
        self.column_order
            .iter()
            .filter(|id| self.is_visible(id))
            .map(String::as_str)
    }
}

/// The preference persistence collaborator.
///
/// Failures are reported to the layout manager, which logs and otherwise ignores them:
/// persisted preferences are best-effort.
pub trait PreferenceStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<ColumnPreferences>, PreferenceError>;
    fn save(&self, key: &str, preferences: &ColumnPreferences) -> Result<(), PreferenceError>;
}

/// Callback fired with the saved preferences each time a debounced save is flushed.
pub type PreferencesCallback = Arc<dyn Fn(&ColumnPreferences) + Send + Sync>;

/// Owns column layout state and debounced persistence of it.
///
/// Every mutating call takes the host's `now_ms`; the save is forwarded to the store and the
/// callback once `debounce_ms` passes without further changes (see [`Self::tick`]). After
/// [`Self::dispose`] nothing is written.
pub struct ColumnLayoutManager {
    columns: Vec<ColumnDescriptor>,
    state: ColumnLayoutState,
    auto_fit_padding: u32,
    save_debounce: Debouncer,
    store: Option<Arc<dyn PreferenceStore>>,
    preferences_key: Option<String>,
    on_save: Option<PreferencesCallback>,
    disposed: bool,
}

impl ColumnLayoutManager {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        let state = ColumnLayoutState::initial(&columns);
        Self {
            columns,
            state,
            auto_fit_padding: 16,
            save_debounce: Debouncer::new(300),
            store: None,
            preferences_key: None,
            on_save: None,
            disposed: false,
        }
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.save_debounce.set_delay_ms(debounce_ms);
        self
    }

    pub fn with_auto_fit_padding(mut self, padding: u32) -> Self {
        self.auto_fit_padding = padding;
        self
    }

    pub fn with_on_save(mut self, on_save: Option<PreferencesCallback>) -> Self {
        self.on_save = on_save;
        self
    }

    /// Attaches a store and restores preferences saved under `key`, if any.
    pub fn with_store(mut self, store: Arc<dyn PreferenceStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        match store.load(&key) {
            Ok(Some(saved)) => {
                gdebug!(key = key.as_str(), "restored column preferences");
                self.state = saved.normalized(&self.columns);
            }
            Ok(None) => {}
            Err(_err) => {
                gwarn!(key = key.as_str(), error = %_err, "failed to load column preferences");
            }
        }
        self.store = Some(store);
        self.preferences_key = Some(key);
        self
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, id: &str) -> Option<&ColumnDescriptor> {
        find(&self.columns, id)
    }

    pub fn state(&self) -> &ColumnLayoutState {
        &self.state
    }

    pub fn auto_fit_padding(&self) -> u32 {
        self.auto_fit_padding
    }

    pub fn width_of(&self, id: &str) -> Option<u32> {
        self.state.width_of(&self.columns, id)
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.state.is_visible(id)
    }

    /// Visible columns in display order.
    pub fn visible_columns(&self) -> Vec<&ColumnDescriptor> {
        self.state
            .visible_ids()
            .filter_map(|id| find(&self.columns, id))
            .collect()
    }

    pub fn visible_count(&self) -> usize {
        self.state.visible_ids().count()
    }

    /// Sum of visible column widths.
    pub fn total_width(&self) -> u64 {
        self.state
            .visible_ids()
            .filter_map(|id| self.width_of(id))
            .map(u64::from)
            .sum()
    }

    pub fn resize(&mut self, id: &str, delta_px: i64, now_ms: u64) -> Option<LayoutChange> {
        let changed = self.state.resize(&self.columns, id, delta_px);
        self.changed(changed, LayoutChange::Sizing, now_ms)
    }

    pub fn auto_fit(&mut self, id: &str, measured_widths: &[u32], now_ms: u64) -> Option<LayoutChange> {
        let changed =
            self.state
                .auto_fit(&self.columns, id, measured_widths, self.auto_fit_padding);
        self.changed(changed, LayoutChange::Sizing, now_ms)
    }

    pub fn reorder(&mut self, dragged: &str, target: &str, now_ms: u64) -> Option<LayoutChange> {
        let changed = self.state.reorder(dragged, target);
        self.changed(changed, LayoutChange::Order, now_ms)
    }

    pub fn set_visibility(&mut self, id: &str, visible: bool, now_ms: u64) -> Option<LayoutChange> {
        let changed = self.state.set_visibility(&self.columns, id, visible);
        self.changed(changed, LayoutChange::Visibility, now_ms)
    }

    pub fn reset_sizes(&mut self, now_ms: u64) -> Option<LayoutChange> {
        let changed = !self.state.column_sizing.is_empty();
        self.state.column_sizing.clear();
        self.changed(changed, LayoutChange::Sizing, now_ms)
    }

    pub fn reset_order(&mut self, now_ms: u64) -> Option<LayoutChange> {
        let initial = ColumnLayoutState::initial(&self.columns).column_order;
        let changed = self.state.column_order != initial;
        self.state.column_order = initial;
        self.changed(changed, LayoutChange::Order, now_ms)
    }

    /// Restores the default layout. Returns every dimension that changed.
    pub fn reset_all(&mut self, now_ms: u64) -> Vec<LayoutChange> {
        let mut out = Vec::new();
        out.extend(self.reset_sizes(now_ms));
        out.extend(self.reset_order(now_ms));
        let had_hidden = !self.state.column_visibility.is_empty();
        self.state.column_visibility.clear();
        out.extend(self.changed(had_hidden, LayoutChange::Visibility, now_ms));
        out
    }

    /// Replaces the whole layout (e.g. committed by a host that controls it).
    pub fn replace_state(&mut self, state: ColumnLayoutState, now_ms: u64) -> Vec<LayoutChange> {
        let next = state.normalized(&self.columns);
        let mut out = Vec::new();
        if next.column_sizing != self.state.column_sizing {
            out.push(LayoutChange::Sizing);
        }
        if next.column_order != self.state.column_order {
            out.push(LayoutChange::Order);
        }
        if next.visible_ids().ne(self.state.visible_ids()) {
            out.push(LayoutChange::Visibility);
        }
        self.state = next;
        if !out.is_empty() {
            self.schedule_save(now_ms);
        }
        out
    }

    /// Swaps in a new descriptor set, keeping what layout still applies.
    pub fn set_columns(&mut self, columns: Vec<ColumnDescriptor>) {
        self.columns = columns;
        self.state = self.state.normalized(&self.columns);
    }

    fn changed(&mut self, changed: bool, what: LayoutChange, now_ms: u64) -> Option<LayoutChange> {
        if !changed {
            return None;
        }
        self.schedule_save(now_ms);
        Some(what)
    }

    fn schedule_save(&mut self, now_ms: u64) {
        if self.disposed {
            return;
        }
        self.save_debounce.trigger(now_ms);
    }

    pub fn has_pending_save(&self) -> bool {
        self.save_debounce.is_pending()
    }

    /// Flushes the pending save once its debounce has elapsed.
    ///
    /// Returns the saved preferences when a save happened.
    pub fn tick(&mut self, now_ms: u64) -> Option<ColumnPreferences> {
        if self.disposed || !self.save_debounce.poll(now_ms) {
            return None;
        }
        Some(self.write())
    }

    /// Writes a pending save immediately, regardless of the debounce.
    pub fn flush(&mut self) -> Option<ColumnPreferences> {
        if self.disposed || !self.save_debounce.is_pending() {
            return None;
        }
        self.save_debounce.cancel();
        Some(self.write())
    }

    fn write(&mut self) -> ColumnPreferences {
        let prefs = self.state.clone();
        if let (Some(store), Some(key)) = (&self.store, &self.preferences_key) {
            match store.save(key, &prefs) {
                Ok(()) => {
                    gtrace!(key = key.as_str(), "saved column preferences");
                }
                Err(_err) => {
                    gwarn!(key = key.as_str(), error = %_err, "failed to save column preferences");
                }
            }
        }
        if let Some(cb) = &self.on_save {
            cb(&prefs);
        }
        prefs
    }

    /// Drops any pending save. Later ticks and mutations never write.
    pub fn dispose(&mut self) {
        self.save_debounce.cancel();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl core::fmt::Debug for ColumnLayoutManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ColumnLayoutManager")
            .field("columns", &self.columns)
            .field("state", &self.state)
            .field("auto_fit_padding", &self.auto_fit_padding)
            .field("save_debounce", &self.save_debounce)
            .field("preferences_key", &self.preferences_key)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}
