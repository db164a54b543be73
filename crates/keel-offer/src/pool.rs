//! ResourcePool: the unclaimed remainder of one offer.
//!
//! Built once per evaluation attempt. Stages claim from it in pipeline
//! order, so later stages only see what earlier ones left behind.

use std::collections::BTreeMap;

use keel_core::{Offer, Range, Resource, Value, ranges};
use tracing::debug;

/// Tolerance for scalar comparisons, so 0.1 + 0.2 fits in 0.3.
pub(crate) const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct ResourcePool {
    offer: Offer,
    unreserved_scalars: BTreeMap<String, f64>,
    unreserved_ranges: BTreeMap<String, Vec<Range>>,
    reserved_ranges: BTreeMap<String, Vec<Range>>,
    reserved_by_id: BTreeMap<String, Resource>,
    volumes: BTreeMap<String, Resource>,
    mount_disks: Vec<Resource>,
}

impl ResourcePool {
    pub fn new(offer: &Offer) -> Self {
        let mut pool = Self {
            offer: offer.clone(),
            unreserved_scalars: BTreeMap::new(),
            unreserved_ranges: BTreeMap::new(),
            reserved_ranges: BTreeMap::new(),
            reserved_by_id: BTreeMap::new(),
            volumes: BTreeMap::new(),
            mount_disks: Vec::new(),
        };

        for resource in &offer.resources {
            pool.add(resource);
        }

        for set in pool
            .unreserved_ranges
            .values_mut()
            .chain(pool.reserved_ranges.values_mut())
        {
            *set = ranges::normalize(set);
        }

        debug!(
            offer = %offer.id,
            scalars = pool.unreserved_scalars.len(),
            reservations = pool.reserved_by_id.len(),
            volumes = pool.volumes.len(),
            mount_disks = pool.mount_disks.len(),
            "resource pool built"
        );
        pool
    }

    fn add(&mut self, resource: &Resource) {
        if let Some(persistence_id) = resource.persistence_id() {
            self.volumes
                .insert(persistence_id.to_string(), resource.clone());
            return;
        }

        if !resource.is_reserved() {
            if resource.is_mount_disk() {
                self.mount_disks.push(resource.clone());
                return;
            }
            match &resource.value {
                Value::Scalar { value } => {
                    *self
                        .unreserved_scalars
                        .entry(resource.name.clone())
                        .or_default() += value;
                }
                Value::Ranges { ranges } => self
                    .unreserved_ranges
                    .entry(resource.name.clone())
                    .or_default()
                    .extend_from_slice(ranges),
            }
            return;
        }

        // Reserved ranges are claimed by value, reserved scalars by id.
        match (&resource.value, resource.resource_id()) {
            (Value::Ranges { ranges }, _) => self
                .reserved_ranges
                .entry(resource.name.clone())
                .or_default()
                .extend_from_slice(ranges),
            (Value::Scalar { .. }, Some(id)) => {
                self.reserved_by_id.insert(id.to_string(), resource.clone());
            }
            (Value::Scalar { .. }, None) => {
                debug!(name = %resource.name, role = %resource.role, "ignoring reservation without id");
            }
        }
    }

    pub fn offer(&self) -> &Offer {
        &self.offer
    }

    pub fn offer_id(&self) -> &str {
        &self.offer.id
    }

    /// Unclaimed unreserved amount of a scalar resource.
    pub fn unreserved_scalar(&self, name: &str) -> f64 {
        self.unreserved_scalars.get(name).copied().unwrap_or(0.0)
    }

    /// Claim `amount` of an unreserved scalar. Claims nothing on failure.
    pub fn consume_unreserved_scalar(&mut self, name: &str, amount: f64) -> bool {
        let Some(available) = self.unreserved_scalars.get_mut(name) else {
            return amount <= EPSILON;
        };
        if *available + EPSILON < amount {
            return false;
        }
        *available = (*available - amount).max(0.0);
        true
    }

    /// Claim a reserved scalar entry by its reservation id.
    pub fn consume_reserved(&mut self, resource_id: &str) -> Option<Resource> {
        self.reserved_by_id.remove(resource_id)
    }

    /// Claim an existing persistent volume.
    pub fn consume_volume(&mut self, persistence_id: &str) -> Option<Resource> {
        self.volumes.remove(persistence_id)
    }

    /// Claim the smallest unreserved mount disk holding at least `size`.
    pub fn consume_mount_disk(&mut self, size: f64) -> Option<Resource> {
        let index = self
            .mount_disks
            .iter()
            .enumerate()
            .filter(|(_, disk)| disk.scalar().unwrap_or(0.0) + EPSILON >= size)
            .min_by(|(_, a), (_, b)| {
                a.scalar()
                    .unwrap_or(0.0)
                    .total_cmp(&b.scalar().unwrap_or(0.0))
            })
            .map(|(i, _)| i)?;
        Some(self.mount_disks.remove(index))
    }

    /// Claim one value of a range resource already reserved to the service.
    pub fn consume_reserved_value(&mut self, name: &str, value: u64) -> bool {
        take_value(&mut self.reserved_ranges, name, value)
    }

    /// Claim one value of an unreserved range resource.
    pub fn consume_unreserved_value(&mut self, name: &str, value: u64) -> bool {
        take_value(&mut self.unreserved_ranges, name, value)
    }

    /// Lowest unclaimed unreserved value of a range resource.
    pub fn first_unreserved_value(&self, name: &str) -> Option<u64> {
        self.unreserved_ranges
            .get(name)
            .and_then(|r| ranges::first_value(r))
    }
}

fn take_value(sets: &mut BTreeMap<String, Vec<Range>>, name: &str, value: u64) -> bool {
    let Some(set) = sets.get_mut(name) else {
        return false;
    };
    if !ranges::contains(set, value) {
        return false;
    }
    *set = ranges::subtract(set, &[Range::single(value)]);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{DiskInfo, DiskSource, ReservationInfo, Volume, VolumeMode};

    fn reserved(name: &str, value: Value, id: &str) -> Resource {
        Resource {
            name: name.to_string(),
            value,
            role: "svc-role".to_string(),
            reservation: Some(ReservationInfo {
                principal: "svc".to_string(),
                resource_id: Some(id.to_string()),
            }),
            disk: None,
        }
    }

    fn mount_disk(size: f64, root: &str) -> Resource {
        let mut disk = Resource::unreserved_scalar("disk", size);
        disk.disk = Some(DiskInfo {
            persistence_id: None,
            volume: None,
            source: Some(DiskSource::Mount {
                root: root.to_string(),
            }),
        });
        disk
    }

    fn offer(resources: Vec<Resource>) -> Offer {
        Offer {
            id: "offer-1".to_string(),
            agent_id: "agent-1".to_string(),
            hostname: "host-1".to_string(),
            resources,
            attributes: Vec::new(),
            executor_ids: Vec::new(),
        }
    }

    #[test]
    fn scalars_are_summed_and_consumed() {
        let mut pool = ResourcePool::new(&offer(vec![
            Resource::unreserved_scalar("cpus", 1.0),
            Resource::unreserved_scalar("cpus", 1.5),
        ]));
        assert_eq!(pool.unreserved_scalar("cpus"), 2.5);

        assert!(pool.consume_unreserved_scalar("cpus", 2.0));
        assert!(!pool.consume_unreserved_scalar("cpus", 1.0));
        assert!((pool.unreserved_scalar("cpus") - 0.5).abs() < EPSILON);
        assert!(!pool.consume_unreserved_scalar("mem", 1.0));
    }

    #[test]
    fn reserved_entries_are_claimed_once() {
        let mut pool = ResourcePool::new(&offer(vec![reserved(
            "cpus",
            Value::scalar(0.5),
            "cpu-id",
        )]));
        assert_eq!(pool.unreserved_scalar("cpus"), 0.0);
        assert!(pool.consume_reserved("cpu-id").is_some());
        assert!(pool.consume_reserved("cpu-id").is_none());
    }

    #[test]
    fn range_values_are_claimed_individually() {
        let mut pool = ResourcePool::new(&offer(vec![
            Resource::unreserved_ranges("ports", vec![Range::new(1000, 1002)]),
            reserved("ports", Value::ranges(vec![Range::single(8080)]), "p"),
        ]));

        assert_eq!(pool.first_unreserved_value("ports"), Some(1000));
        assert!(pool.consume_unreserved_value("ports", 1000));
        assert!(!pool.consume_unreserved_value("ports", 1000));
        assert_eq!(pool.first_unreserved_value("ports"), Some(1001));

        assert!(!pool.consume_unreserved_value("ports", 8080));
        assert!(pool.consume_reserved_value("ports", 8080));
        assert!(!pool.consume_reserved_value("ports", 8080));
    }

    #[test]
    fn volumes_are_indexed_by_persistence_id() {
        let mut volume = reserved("disk", Value::scalar(1024.0), "disk-id");
        volume.disk = Some(DiskInfo {
            persistence_id: Some("vol-1".to_string()),
            volume: Some(Volume {
                container_path: "data".to_string(),
                mode: VolumeMode::Rw,
            }),
            source: None,
        });
        let mut pool = ResourcePool::new(&offer(vec![volume.clone()]));

        assert_eq!(pool.consume_volume("vol-1"), Some(volume));
        assert!(pool.consume_reserved("disk-id").is_none());
    }

    #[test]
    fn smallest_fitting_mount_disk_is_chosen() {
        let mut pool = ResourcePool::new(&offer(vec![
            mount_disk(10_000.0, "/mnt/a"),
            mount_disk(500.0, "/mnt/b"),
            mount_disk(2_000.0, "/mnt/c"),
        ]));

        let disk = pool.consume_mount_disk(1_000.0).unwrap();
        assert_eq!(disk.scalar(), Some(2_000.0));
        assert!(pool.consume_mount_disk(20_000.0).is_none());
        assert_eq!(pool.unreserved_scalar("disk"), 0.0);
    }
}
