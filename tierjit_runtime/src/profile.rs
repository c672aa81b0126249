//! Per-function profile records.
//!
//! Profiling code writes here; the type inferer and the speculative code
//! generator read from here. Records are indexed by per-kind profile indices
//! assigned to IR nodes when the function is built:
//!
//! ```text
//! FunctionProfile
//! ├── guards[i]  GuardProfile   ← guarded-cast sites (observed value type)
//! ├── maps[i]    MapProfile     ← property reads/writes, global reads
//! ├── calls[i]   CallProfile    ← call sites (observed callee)
//! └── executions                ← invocation counter
//! ```

use crate::object::{MapId, ObjectRef};
use crate::value::{FunctionId, ValueType};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// Configuration
// =============================================================================

/// Thresholds for interpreting profile data.
#[derive(Debug, Clone, Copy)]
pub struct ProfileConfig {
    /// A guard site with more misses than this has no hot type.
    pub max_misses: u32,
    /// Share of observations a type needs to count as hot.
    pub hotness_ratio: f64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            max_misses: 3,
            hotness_ratio: 0.8,
        }
    }
}

/// Number of profile slots of each kind a function needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileCounts {
    pub guards: u32,
    pub maps: u32,
    pub calls: u32,
}

// =============================================================================
// Guard Profiles
// =============================================================================

/// One observed type and how often it was seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeRecord {
    pub ty: ValueType,
    pub count: u32,
}

/// Observed value types at a guarded-cast site.
///
/// Two types are tracked; anything beyond them counts as a miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardProfile {
    records: [TypeRecord; 2],
    misses: u32,
}

impl GuardProfile {
    pub fn record(&mut self, ty: ValueType) {
        if matches!(ty, ValueType::Undefined | ValueType::Null) {
            return;
        }
        for record in &mut self.records {
            if record.count == 0 {
                *record = TypeRecord { ty, count: 1 };
                return;
            }
            if record.ty == ty {
                record.count = record.count.saturating_add(1);
                return;
            }
        }
        self.misses = self.misses.saturating_add(1);
    }

    pub fn total(&self) -> u32 {
        self.records[0].count + self.records[1].count + self.misses
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// The dominant primitive type, if one dominates.
    pub fn hot_type(&self, config: &ProfileConfig) -> Option<ValueType> {
        if self.misses > config.max_misses {
            return None;
        }
        let total = self.total();
        if total == 0 {
            return None;
        }
        self.records
            .iter()
            .filter(|r| r.count > 0)
            .find(|r| r.count as f64 / total as f64 >= config.hotness_ratio)
            .map(|r| r.ty)
    }
}

// =============================================================================
// Map Profiles
// =============================================================================

/// What a property access found, as seen by profiling code.
#[derive(Debug, Clone)]
pub struct PropertyObservation {
    /// Map of the receiver.
    pub map: MapId,
    pub slot: u32,
    pub is_data: bool,
    pub is_writable: bool,
    /// Holder and its map when the property lives on the receiver's prototype.
    pub inherited: Option<(ObjectRef, MapId)>,
}

impl PropertyObservation {
    fn same_shape(&self, other: &PropertyObservation) -> bool {
        self.map == other.map
            && self.slot == other.slot
            && match (&self.inherited, &other.inherited) {
                (None, None) => true,
                (Some((a, am)), Some((b, bm))) => Arc::ptr_eq(a, b) && am == bm,
                _ => false,
            }
    }
}

/// Observed layout at a property access site.
#[derive(Debug, Clone, Default)]
pub struct MapProfile {
    observation: Option<PropertyObservation>,
    too_dynamic: bool,
}

impl MapProfile {
    pub fn record(&mut self, observation: Option<PropertyObservation>) {
        if self.too_dynamic {
            return;
        }
        match (&self.observation, observation) {
            (_, None) => self.too_dynamic = true,
            (None, Some(seen)) => self.observation = Some(seen),
            (Some(current), Some(seen)) if current.same_shape(&seen) => {}
            (Some(_), Some(_)) => {
                self.observation = None;
                self.too_dynamic = true;
            }
        }
    }

    #[inline]
    pub fn is_too_dynamic(&self) -> bool {
        self.too_dynamic
    }

    /// The single observed layout, if the site stayed monomorphic.
    pub fn monomorphic(&self) -> Option<&PropertyObservation> {
        if self.too_dynamic {
            None
        } else {
            self.observation.as_ref()
        }
    }
}

// =============================================================================
// Call Profiles
// =============================================================================

/// Observed callee at a call site.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallProfile {
    target: Option<FunctionId>,
    polymorphic: bool,
}

impl CallProfile {
    pub fn record(&mut self, target: FunctionId) {
        match self.target {
            None if !self.polymorphic => self.target = Some(target),
            Some(current) if current != target => {
                self.target = None;
                self.polymorphic = true;
            }
            _ => {}
        }
    }

    #[inline]
    pub fn is_polymorphic(&self) -> bool {
        self.polymorphic
    }

    /// The single observed callee, if there is one.
    pub fn target(&self) -> Option<FunctionId> {
        self.target
    }
}

// =============================================================================
// Function Profile
// =============================================================================

#[derive(Debug, Default)]
struct ProfileData {
    guards: Vec<GuardProfile>,
    maps: Vec<MapProfile>,
    calls: Vec<CallProfile>,
}

/// Mutable profile record for one function.
#[derive(Debug)]
pub struct FunctionProfile {
    function: FunctionId,
    config: ProfileConfig,
    executions: AtomicU32,
    data: Mutex<ProfileData>,
}

impl FunctionProfile {
    pub fn new(function: FunctionId, counts: ProfileCounts, config: ProfileConfig) -> Self {
        let profile = Self {
            function,
            config,
            executions: AtomicU32::new(0),
            data: Mutex::new(ProfileData::default()),
        };
        profile.ensure_capacity(counts);
        profile
    }

    #[inline]
    pub fn function(&self) -> FunctionId {
        self.function
    }

    #[inline]
    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    /// Grow the record vectors; recompilation may add profile sites.
    pub fn ensure_capacity(&self, counts: ProfileCounts) {
        let mut data = self.data.lock();
        if data.guards.len() < counts.guards as usize {
            data.guards.resize(counts.guards as usize, GuardProfile::default());
        }
        if data.maps.len() < counts.maps as usize {
            data.maps.resize(counts.maps as usize, MapProfile::default());
        }
        if data.calls.len() < counts.calls as usize {
            data.calls.resize(counts.calls as usize, CallProfile::default());
        }
    }

    pub fn record_execution(&self) -> u32 {
        self.executions.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Hot once executed more than `threshold` times.
    #[inline]
    pub fn is_hot(&self, threshold: u32) -> bool {
        self.executions() > threshold
    }

    pub fn record_type(&self, index: u32, ty: ValueType) {
        if let Some(guard) = self.data.lock().guards.get_mut(index as usize) {
            guard.record(ty);
        }
    }

    pub fn record_property(&self, index: u32, observation: Option<PropertyObservation>) {
        if let Some(map) = self.data.lock().maps.get_mut(index as usize) {
            map.record(observation);
        }
    }

    pub fn record_call(&self, index: u32, target: FunctionId) {
        if let Some(call) = self.data.lock().calls.get_mut(index as usize) {
            call.record(target);
        }
    }

    pub fn guard(&self, index: u32) -> Option<GuardProfile> {
        self.data.lock().guards.get(index as usize).copied()
    }

    /// Dominant type at a guard site.
    pub fn hot_type(&self, index: u32) -> Option<ValueType> {
        self.guard(index)?.hot_type(&self.config)
    }

    pub fn map(&self, index: u32) -> Option<MapProfile> {
        self.data.lock().maps.get(index as usize).cloned()
    }

    pub fn call(&self, index: u32) -> Option<CallProfile> {
        self.data.lock().calls.get(index as usize).copied()
    }

    /// Whether any site has recorded something.
    pub fn is_populated(&self) -> bool {
        let data = self.data.lock();
        data.guards.iter().any(|g| g.total() > 0)
            || data.maps.iter().any(|m| m.monomorphic().is_some() || m.is_too_dynamic())
            || data.calls.iter().any(|c| c.target().is_some() || c.is_polymorphic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_hot_type_uses_ratio() {
        let config = ProfileConfig::default();
        let mut guard = GuardProfile::default();
        for _ in 0..9 {
            guard.record(ValueType::Int32);
        }
        guard.record(ValueType::String);
        assert_eq!(guard.hot_type(&config), Some(ValueType::Int32));

        let mut split = GuardProfile::default();
        split.record(ValueType::Int32);
        split.record(ValueType::String);
        assert_eq!(split.hot_type(&config), None);
    }

    #[test]
    fn test_guard_ignores_undefined_and_null() {
        let mut guard = GuardProfile::default();
        guard.record(ValueType::Undefined);
        guard.record(ValueType::Null);
        assert_eq!(guard.total(), 0);
        guard.record(ValueType::Double);
        assert_eq!(guard.hot_type(&ProfileConfig::default()), Some(ValueType::Double));
    }

    #[test]
    fn test_guard_too_many_misses() {
        let mut guard = GuardProfile::default();
        for _ in 0..100 {
            guard.record(ValueType::Int32);
        }
        guard.record(ValueType::String);
        for _ in 0..4 {
            guard.record(ValueType::Boolean);
        }
        assert_eq!(guard.misses(), 4);
        assert_eq!(guard.hot_type(&ProfileConfig::default()), None);
    }

    #[test]
    fn test_map_profile_becomes_too_dynamic() {
        let observed = |map| PropertyObservation {
            map: MapId(map),
            slot: 0,
            is_data: true,
            is_writable: true,
            inherited: None,
        };
        let mut profile = MapProfile::default();
        profile.record(Some(observed(1)));
        profile.record(Some(observed(1)));
        assert_eq!(profile.monomorphic().map(|o| o.map), Some(MapId(1)));
        profile.record(Some(observed(2)));
        assert!(profile.is_too_dynamic());
        assert!(profile.monomorphic().is_none());
        profile.record(Some(observed(1)));
        assert!(profile.monomorphic().is_none());
    }

    #[test]
    fn test_call_profile_polymorphic() {
        let mut call = CallProfile::default();
        call.record(FunctionId(1));
        call.record(FunctionId(1));
        assert_eq!(call.target(), Some(FunctionId(1)));
        call.record(FunctionId(2));
        assert!(call.is_polymorphic());
        call.record(FunctionId(1));
        assert_eq!(call.target(), None);
    }

    #[test]
    fn test_function_profile_hotness_and_capacity() {
        let counts = ProfileCounts { guards: 1, maps: 0, calls: 0 };
        let profile = FunctionProfile::new(FunctionId(0), counts, ProfileConfig::default());
        for _ in 0..6 {
            profile.record_execution();
        }
        assert!(!profile.is_hot(6));
        profile.record_execution();
        assert!(profile.is_hot(6));

        profile.record_type(3, ValueType::Int32);
        assert!(profile.guard(3).is_none());
        profile.ensure_capacity(ProfileCounts { guards: 4, maps: 0, calls: 0 });
        profile.record_type(3, ValueType::Int32);
        assert_eq!(profile.hot_type(3), Some(ValueType::Int32));
        assert!(profile.is_populated());
    }
}
