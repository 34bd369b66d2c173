//! Compartment reservation state machine and pickup codes.
//!
//! Coordinator-authoritative lifecycle per compartment:
//! `Available → Reserved → Occupied → Open (transient) → Available`,
//! with `Fault` and `Sanitizing` overlays driven by hardware events and
//! maintenance commands.
//!
//! All mutations happen under one service lock with the status
//! re-checked before every transition, so two concurrent assignments
//! can never double-book a compartment. Pickup codes are unique among
//! currently outstanding codes; generation regenerates on collision.

use crate::relay::RelayError;
use chrono::{DateTime, Utc};
use locknet::consts::{PICKUP_CODE_ALPHABET, PICKUP_CODE_LEN};
use locknet::hw::{ColumnId, CompartmentId, SizeClass};
use locknet::protocol::EventKind;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Order identity handed in by the excluded order/catalog layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coordinator-side compartment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompartmentStatus {
    Available,
    Reserved,
    Occupied,
    /// Transient: door opened for pickup or inspection.
    Open,
    /// Transient: close command relayed, door still travelling.
    Closing,
    Fault,
    Sanitizing,
}

/// Reservation-layer errors. All caller-visible and recoverable except
/// where the compartment itself is faulted.
#[derive(Debug, Clone, Error)]
pub enum ReservationError {
    #[error("no such compartment: {0}")]
    CompartmentNotFound(CompartmentId),

    #[error("no available compartments")]
    NoAvailableCompartments,

    #[error("compartment {compartment} is {status:?}, not available")]
    CompartmentUnavailable {
        compartment: CompartmentId,
        status: CompartmentStatus,
    },

    #[error("invalid or expired pickup code")]
    InvalidOrExpiredCode,

    #[error("no such order: {0}")]
    OrderNotFound(OrderId),

    #[error("order {0} already has an outstanding reservation")]
    OrderAlreadyAssigned(OrderId),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

#[derive(Debug, Clone)]
struct CompartmentEntry {
    size: SizeClass,
    status: CompartmentStatus,
    order: Option<OrderId>,
    changed_at: DateTime<Utc>,
    sanitize_until: Option<Instant>,
}

#[derive(Debug, Clone)]
struct OrderEntry {
    compartment: CompartmentId,
    code: String,
    picked_up: bool,
}

/// Read-only compartment view for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct CompartmentView {
    pub id: CompartmentId,
    pub size: SizeClass,
    pub status: CompartmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderId>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    compartments: BTreeMap<CompartmentId, CompartmentEntry>,
    orders: HashMap<OrderId, OrderEntry>,
}

/// Owned reservation service; construct one per coordinator.
pub struct ReservationService {
    inner: Mutex<Inner>,
}

impl ReservationService {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Create compartment records for a newly announced column.
    ///
    /// Existing records keep their status and binding; only missing
    /// indices are created. Sizes beyond the configured list default to
    /// `Medium`.
    pub fn register_column(&self, column: &ColumnId, count: u8, sizes: &[SizeClass]) {
        let mut inner = self.inner.lock();
        for index in 0..count {
            let id = CompartmentId::new(column.clone(), index);
            inner.compartments.entry(id).or_insert_with(|| {
                CompartmentEntry {
                    size: sizes.get(index as usize).copied().unwrap_or_default(),
                    status: CompartmentStatus::Available,
                    order: None,
                    changed_at: Utc::now(),
                    sanitize_until: None,
                }
            });
        }
    }

    /// Bind an order to a compartment and issue a pickup code.
    ///
    /// With an explicit compartment, the compartment must be
    /// `Available`; otherwise the first `Available` compartment
    /// (filtered by size when given) is selected. Check-and-set runs
    /// entirely under the service lock.
    pub fn assign(
        &self,
        order: &OrderId,
        compartment: Option<CompartmentId>,
        size: Option<SizeClass>,
    ) -> Result<String, ReservationError> {
        self.assign_with_rng(order, compartment, size, &mut rand::thread_rng())
    }

    /// `assign` with an injected RNG (deterministic tests).
    pub fn assign_with_rng<R: Rng>(
        &self,
        order: &OrderId,
        compartment: Option<CompartmentId>,
        size: Option<SizeClass>,
        rng: &mut R,
    ) -> Result<String, ReservationError> {
        let mut inner = self.inner.lock();

        if inner
            .orders
            .get(order)
            .is_some_and(|entry| !entry.picked_up)
        {
            return Err(ReservationError::OrderAlreadyAssigned(order.clone()));
        }

        let target = match compartment {
            Some(id) => {
                let entry = inner
                    .compartments
                    .get(&id)
                    .ok_or_else(|| ReservationError::CompartmentNotFound(id.clone()))?;
                if entry.status != CompartmentStatus::Available {
                    return Err(ReservationError::CompartmentUnavailable {
                        compartment: id,
                        status: entry.status,
                    });
                }
                id
            }
            None => inner
                .compartments
                .iter()
                .find(|(_, e)| {
                    e.status == CompartmentStatus::Available
                        && size.is_none_or(|s| e.size == s)
                })
                .map(|(id, _)| id.clone())
                .ok_or(ReservationError::NoAvailableCompartments)?,
        };

        let outstanding: HashSet<&str> = inner
            .orders
            .values()
            .filter(|e| !e.picked_up)
            .map(|e| e.code.as_str())
            .collect();
        let code = unique_code(rng, &outstanding);
        drop(outstanding);

        inner.orders.insert(
            order.clone(),
            OrderEntry {
                compartment: target.clone(),
                code: code.clone(),
                picked_up: false,
            },
        );
        let entry = inner
            .compartments
            .get_mut(&target)
            .expect("selected compartment exists under the same lock");
        entry.status = CompartmentStatus::Reserved;
        entry.order = Some(order.clone());
        entry.changed_at = Utc::now();

        info!(order = %order, compartment = %target, "order assigned");
        Ok(code)
    }

    /// The courier has loaded the order: `Reserved → Occupied`.
    pub fn mark_loaded(&self, order: &OrderId) -> Result<CompartmentId, ReservationError> {
        let mut inner = self.inner.lock();
        let target = match inner.orders.get(order) {
            Some(entry) if !entry.picked_up => entry.compartment.clone(),
            _ => return Err(ReservationError::OrderNotFound(order.clone())),
        };
        let entry = inner
            .compartments
            .get_mut(&target)
            .ok_or_else(|| ReservationError::CompartmentNotFound(target.clone()))?;
        if entry.status != CompartmentStatus::Reserved {
            return Err(ReservationError::CompartmentUnavailable {
                compartment: target,
                status: entry.status,
            });
        }
        entry.status = CompartmentStatus::Occupied;
        entry.changed_at = Utc::now();
        info!(order = %order, compartment = %target, "order loaded");
        Ok(target)
    }

    /// Look up a pickup code: normalizes (uppercase, strip whitespace),
    /// requires a matching unclaimed order whose compartment is
    /// `Occupied`. Does not transition state; the caller relays the
    /// unlock first and calls [`mark_open`](Self::mark_open) on success.
    pub fn validate_code(
        &self,
        code: &str,
    ) -> Result<(OrderId, CompartmentId), ReservationError> {
        let normalized = normalize_code(code);
        let inner = self.inner.lock();
        let (order_id, entry) = inner
            .orders
            .iter()
            .find(|(_, e)| !e.picked_up && e.code == normalized)
            .ok_or(ReservationError::InvalidOrExpiredCode)?;
        let comp = inner
            .compartments
            .get(&entry.compartment)
            .ok_or(ReservationError::InvalidOrExpiredCode)?;
        if comp.status != CompartmentStatus::Occupied {
            return Err(ReservationError::InvalidOrExpiredCode);
        }
        Ok((order_id.clone(), entry.compartment.clone()))
    }

    /// The unlock relay succeeded: `Occupied → Open`.
    pub fn mark_open(&self, compartment: &CompartmentId) {
        self.transition(compartment, CompartmentStatus::Open);
    }

    /// A close command was relayed: door travelling.
    pub fn mark_closing(&self, compartment: &CompartmentId) {
        self.transition(compartment, CompartmentStatus::Closing);
    }

    /// Start a sanitize overlay: requires `Available`.
    pub fn start_sanitize(
        &self,
        compartment: &CompartmentId,
        until: Instant,
    ) -> Result<(), ReservationError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .compartments
            .get_mut(compartment)
            .ok_or_else(|| ReservationError::CompartmentNotFound(compartment.clone()))?;
        if entry.status != CompartmentStatus::Available {
            return Err(ReservationError::CompartmentUnavailable {
                compartment: compartment.clone(),
                status: entry.status,
            });
        }
        entry.status = CompartmentStatus::Sanitizing;
        entry.sanitize_until = Some(until);
        entry.changed_at = Utc::now();
        Ok(())
    }

    /// Return elapsed sanitize overlays to `Available`.
    pub fn sweep_sanitize(&self, now: Instant) {
        let mut inner = self.inner.lock();
        for (id, entry) in inner.compartments.iter_mut() {
            if entry.status == CompartmentStatus::Sanitizing
                && entry.sanitize_until.is_some_and(|until| now >= until)
            {
                entry.status = CompartmentStatus::Available;
                entry.sanitize_until = None;
                entry.changed_at = Utc::now();
                info!(compartment = %id, "sanitize complete");
            }
        }
    }

    /// Apply a hardware event to the reservation lifecycle.
    pub fn handle_event(&self, compartment: &CompartmentId, kind: EventKind) {
        let mut inner = self.inner.lock();
        let Inner { compartments, orders } = &mut *inner;
        let Some(entry) = compartments.get_mut(compartment) else {
            debug!(compartment = %compartment, ?kind, "event for unknown compartment");
            return;
        };

        match kind {
            EventKind::ItemRemoved => {
                let claimable = matches!(
                    entry.status,
                    CompartmentStatus::Occupied | CompartmentStatus::Open
                );
                if let (true, Some(order_id)) = (claimable, entry.order.clone()) {
                    if let Some(order) = orders.get_mut(&order_id) {
                        order.picked_up = true;
                    }
                    entry.order = None;
                    entry.status = CompartmentStatus::Available;
                    entry.changed_at = Utc::now();
                    info!(order = %order_id, compartment = %compartment, "order picked up");
                }
            }
            EventKind::DoorOpened => {
                if entry.status == CompartmentStatus::Occupied {
                    entry.status = CompartmentStatus::Open;
                    entry.changed_at = Utc::now();
                }
            }
            EventKind::DoorClosed => {
                if matches!(
                    entry.status,
                    CompartmentStatus::Open | CompartmentStatus::Closing
                ) {
                    let still_loaded = entry
                        .order
                        .as_ref()
                        .and_then(|o| orders.get(o))
                        .is_some_and(|o| !o.picked_up);
                    entry.status = if still_loaded {
                        CompartmentStatus::Occupied
                    } else {
                        CompartmentStatus::Available
                    };
                    entry.changed_at = Utc::now();
                }
            }
            EventKind::ItemDetected => {
                // Loading is confirmed through mark_loaded; the raw
                // occupancy edge is audit-only.
                debug!(compartment = %compartment, "item detected");
            }
            EventKind::Fault => {
                entry.status = CompartmentStatus::Fault;
                entry.changed_at = Utc::now();
                warn!(compartment = %compartment, "compartment faulted");
            }
            EventKind::FaultCleared => {
                if let Some(order_id) = entry.order.take() {
                    // Reassignment invalidates the outstanding code.
                    orders.remove(&order_id);
                    warn!(
                        order = %order_id,
                        compartment = %compartment,
                        "fault clear dropped the order binding"
                    );
                }
                entry.status = CompartmentStatus::Available;
                entry.sanitize_until = None;
                entry.changed_at = Utc::now();
            }
        }
    }

    /// Status and binding for one compartment.
    pub fn status_of(
        &self,
        compartment: &CompartmentId,
    ) -> Option<(CompartmentStatus, Option<OrderId>)> {
        self.inner
            .lock()
            .compartments
            .get(compartment)
            .map(|e| (e.status, e.order.clone()))
    }

    /// Read-only compartment list.
    pub fn compartments(&self) -> Vec<CompartmentView> {
        self.inner
            .lock()
            .compartments
            .iter()
            .map(|(id, e)| CompartmentView {
                id: id.clone(),
                size: e.size,
                status: e.status,
                order: e.order.clone(),
                changed_at: e.changed_at,
            })
            .collect()
    }

    /// Whether the order has been picked up. `None` for unknown orders.
    pub fn picked_up(&self, order: &OrderId) -> Option<bool> {
        self.inner.lock().orders.get(order).map(|e| e.picked_up)
    }

    fn transition(&self, compartment: &CompartmentId, status: CompartmentStatus) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.compartments.get_mut(compartment) {
            entry.status = status;
            entry.changed_at = Utc::now();
        }
    }
}

impl Default for ReservationService {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize user input: uppercase, all whitespace stripped.
fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Generate a code unique among the outstanding set, regenerating on
/// collision.
fn unique_code<R: Rng>(rng: &mut R, outstanding: &HashSet<&str>) -> String {
    loop {
        let code: String = (0..PICKUP_CODE_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..PICKUP_CODE_ALPHABET.len());
                PICKUP_CODE_ALPHABET[idx] as char
            })
            .collect();
        if !outstanding.contains(code.as_str()) {
            return code;
        }
    }
}
