//! Resource construction and bookkeeping helpers.
//!
//! Builds the resource entries a task expects from its specification,
//! updates previously reserved entries in place, and coalesces the
//! per-port entries into the single `ports` entry the wire protocol allows.

use thiserror::Error;

use crate::proto::{DiskInfo, DiskSource, ReservationInfo, Resource, Value, Volume, VolumeMode};
use crate::ranges;
use crate::spec::{ResourceSpec, VolumeSpec, VolumeType};
use crate::DISK_RESOURCE;

/// Errors raised while combining resource values.
#[derive(Debug, Error, PartialEq)]
pub enum ResourceError {
    #[error("resource {name}: cannot combine {old} value with {new} value")]
    Incompatible {
        name: String,
        old: &'static str,
        new: &'static str,
    },

    #[error("resource {name}: malformed value: {reason}")]
    Malformed { name: String, reason: String },
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Scalar { .. } => "scalar",
        Value::Ranges { .. } => "ranges",
    }
}

fn reservation(principal: &str) -> Option<ReservationInfo> {
    Some(ReservationInfo {
        principal: principal.to_string(),
        resource_id: None,
    })
}

/// The entry a task expects for a resource it has never reserved.
pub fn expected_resource(spec: &ResourceSpec) -> Resource {
    Resource {
        name: spec.name.clone(),
        value: spec.value.clone(),
        role: spec.role.clone(),
        reservation: reservation(&spec.principal),
        disk: None,
    }
}

/// Apply a new desired value to a previously reserved entry.
///
/// Reservation metadata (role, principal, resource id) is kept, so the
/// evaluation can find the old reservation and request only the delta.
pub fn update_resource(old: &Resource, spec: &ResourceSpec) -> Result<Resource, ResourceError> {
    match (&old.value, &spec.value) {
        (Value::Scalar { .. }, Value::Scalar { value }) => {
            if !value.is_finite() || *value < 0.0 {
                return Err(ResourceError::Malformed {
                    name: spec.name.clone(),
                    reason: format!("scalar {value} is not a non-negative number"),
                });
            }
        }
        (Value::Ranges { .. }, Value::Ranges { ranges }) => {
            if !ranges::is_well_formed(ranges) {
                return Err(ResourceError::Malformed {
                    name: spec.name.clone(),
                    reason: format!("ranges {ranges:?} have begin > end"),
                });
            }
        }
        (old_value, new_value) => {
            return Err(ResourceError::Incompatible {
                name: spec.name.clone(),
                old: kind_of(old_value),
                new: kind_of(new_value),
            });
        }
    }

    let mut updated = old.clone();
    updated.value = spec.value.clone();
    Ok(updated)
}

/// The disk entry for a volume that has not been created yet.
pub fn desired_volume(spec: &VolumeSpec) -> Resource {
    let source = match spec.volume_type {
        VolumeType::Root => None,
        // The mount root is only known once a mount disk is matched.
        VolumeType::Mount => Some(DiskSource::Mount {
            root: String::new(),
        }),
    };
    Resource {
        name: DISK_RESOURCE.to_string(),
        value: Value::scalar(spec.size),
        role: spec.role.clone(),
        reservation: reservation(&spec.principal),
        disk: Some(DiskInfo {
            persistence_id: None,
            volume: Some(Volume {
                container_path: spec.container_path.clone(),
                mode: VolumeMode::Rw,
            }),
            source,
        }),
    }
}

/// Union the ranges of `extra` into `base`.
pub fn merge_ranges(base: &Resource, extra: &Resource) -> Result<Resource, ResourceError> {
    match (&base.value, &extra.value) {
        (Value::Ranges { ranges: a }, Value::Ranges { ranges: b }) => {
            let mut merged = base.clone();
            merged.value = Value::ranges(ranges::union(a, b));
            Ok(merged)
        }
        (a, b) => Err(ResourceError::Incompatible {
            name: base.name.clone(),
            old: kind_of(a),
            new: kind_of(b),
        }),
    }
}

/// Replace all port entries with a single `ports` entry.
///
/// The surviving entry takes its name, role and principal from the first
/// port entry; its ranges are the union of every concrete port (dynamic
/// `0` placeholders are dropped, they get resolved during evaluation) and
/// any per-reservation resource id is cleared. Non-port entries keep their
/// relative order and the ports entry, if any, comes last.
pub fn coalesce_resources(resources: Vec<Resource>) -> Vec<Resource> {
    let (ports, mut others): (Vec<Resource>, Vec<Resource>) =
        resources.into_iter().partition(Resource::is_ports);

    let mut iter = ports.into_iter();
    let Some(mut coalesced) = iter.next() else {
        return others;
    };

    let mut all_ranges: Vec<_> = coalesced.ranges().unwrap_or_default().to_vec();
    for port in iter {
        all_ranges.extend_from_slice(port.ranges().unwrap_or_default());
    }
    all_ranges.retain(|r| !(r.begin == 0 && r.end == 0));

    coalesced.value = Value::ranges(ranges::normalize(&all_ranges));
    if let Some(reservation) = coalesced.reservation.as_mut() {
        reservation.resource_id = None;
    }

    others.push(coalesced);
    others
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::Range;

    fn reserved_port(port: u64, resource_id: &str) -> Resource {
        Resource {
            name: "ports".to_string(),
            value: Value::ranges(vec![Range::single(port)]),
            role: "svc-role".to_string(),
            reservation: Some(ReservationInfo {
                principal: "svc".to_string(),
                resource_id: Some(resource_id.to_string()),
            }),
            disk: None,
        }
    }

    #[test]
    fn coalesces_single_ports_into_one_entry() {
        let cpus = Resource::unreserved_scalar("cpus", 1.0);
        let resources = vec![
            reserved_port(8080, "a"),
            cpus.clone(),
            reserved_port(9090, "b"),
            reserved_port(7070, "c"),
        ];

        let coalesced = coalesce_resources(resources);

        assert_eq!(coalesced.len(), 2);
        assert_eq!(coalesced[0], cpus);
        let ports = &coalesced[1];
        assert_eq!(
            ports.ranges().unwrap(),
            &[Range::single(7070), Range::single(8080), Range::single(9090)]
        );
        assert_eq!(ports.resource_id(), None);
        assert_eq!(ports.role, "svc-role");
        assert_eq!(coalesced.iter().filter(|r| r.is_ports()).count(), 1);
    }

    #[test]
    fn coalesce_drops_dynamic_placeholders() {
        let coalesced = coalesce_resources(vec![reserved_port(0, "a"), reserved_port(4000, "b")]);
        assert_eq!(coalesced[0].ranges().unwrap(), &[Range::single(4000)]);
    }

    #[test]
    fn coalesce_without_ports_is_identity() {
        let resources = vec![
            Resource::unreserved_scalar("cpus", 1.0),
            Resource::unreserved_scalar("mem", 256.0),
        ];
        assert_eq!(coalesce_resources(resources.clone()), resources);
    }

    #[test]
    fn update_keeps_reservation_metadata() {
        let mut old = Resource::unreserved_scalar("cpus", 0.5);
        old.role = "svc-role".to_string();
        old.reservation = Some(ReservationInfo {
            principal: "svc".to_string(),
            resource_id: Some("cpu-id".to_string()),
        });
        let spec = ResourceSpec::scalar("cpus", 1.0, "svc-role", "svc");

        let updated = update_resource(&old, &spec).unwrap();

        assert_eq!(updated.scalar(), Some(1.0));
        assert_eq!(updated.resource_id(), Some("cpu-id"));
    }

    #[test]
    fn update_rejects_kind_change() {
        let old = Resource::unreserved_ranges("cpus", vec![Range::new(1, 2)]);
        let spec = ResourceSpec::scalar("cpus", 1.0, "svc-role", "svc");

        let err = update_resource(&old, &spec).unwrap_err();
        assert!(matches!(err, ResourceError::Incompatible { .. }));
    }

    #[test]
    fn update_rejects_inverted_range() {
        let old = reserved_port(8080, "a");
        let mut spec = ResourceSpec::port("http", 8080, "svc-role", "svc");
        spec.value = Value::ranges(vec![Range::new(9000, 8000)]);

        let err = update_resource(&old, &spec).unwrap_err();
        assert!(matches!(err, ResourceError::Malformed { .. }));
    }

    #[test]
    fn desired_mount_volume_has_mount_source() {
        let spec = VolumeSpec {
            volume_type: VolumeType::Mount,
            container_path: "data".to_string(),
            size: 2048.0,
            role: "svc-role".to_string(),
            principal: "svc".to_string(),
        };
        let volume = desired_volume(&spec);
        assert!(volume.is_mount_disk());
        assert_eq!(volume.container_path(), Some("data"));
        assert_eq!(volume.scalar(), Some(2048.0));
    }

    #[test]
    fn merge_ranges_requires_ranges() {
        let a = reserved_port(1, "a");
        let b = reserved_port(2, "b");
        let merged = merge_ranges(&a, &b).unwrap();
        assert_eq!(merged.ranges().unwrap(), &[Range::new(1, 2)]);

        let cpus = Resource::unreserved_scalar("cpus", 1.0);
        assert!(merge_ranges(&a, &cpus).is_err());
    }
}
