use crate::commands::Command;
use crate::entities::{Device, InstructionStatus};
use crate::store::GlobalStore;

use super::algorithm::DispatchAlgorithm;

/// Hands an idle truck the next pending instruction already naming it as
/// carrier.
///
/// # Algorithm Behavior
///
/// 1. Ignores cranes; they are driven by explicit crane commands
/// 2. Picks the first PENDING, unassigned instruction (ref-no order) whose
///    carry device is the idle truck
/// 3. Emits an assignment plus a move to the instruction's origin
///
/// Deterministic and cheap, which makes it the baseline for scenario runs.
#[derive(Debug, Default)]
pub struct PendingInstructionDispatch;

impl DispatchAlgorithm for PendingInstructionDispatch {
    fn on_device_idle(&self, device: &Device, store: &GlobalStore, _now: u64) -> Vec<Command> {
        if !device.is_truck() {
            return Vec::new();
        }
        let next = store
            .instructions()
            .filter(|wi| {
                wi.status == InstructionStatus::Pending
                    && wi.assigned_at.is_none()
                    && wi.carry_device.as_deref() == Some(device.id.as_str())
            })
            .into_iter()
            .next();
        let Some(instruction) = next else {
            return Vec::new();
        };
        vec![
            Command::AssignTask {
                device_id: device.id.clone(),
                wi_ref: instruction.ref_no.clone(),
            },
            Command::Move {
                truck_id: device.id.clone(),
                waypoints: vec![instruction.from_position],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BusinessType, WorkInstruction};
    use crate::spatial::Point;
    use crate::store::StoreSnapshot;

    #[test]
    fn picks_first_pending_instruction_for_the_truck() {
        let mut wi_2 = WorkInstruction::new("WI-2", BusinessType::Load, "C2")
            .with_devices(None, Some("T01"), None);
        wi_2.from_position = Point::new(30.0, 0.0);
        let mut wi_1 = WorkInstruction::new("WI-1", BusinessType::Load, "C1")
            .with_devices(None, Some("T01"), None);
        wi_1.assigned_at = Some(0);
        let other = WorkInstruction::new("WI-0", BusinessType::Load, "C0")
            .with_devices(None, Some("T02"), None);
        let store = GlobalStore::from_snapshot(StoreSnapshot {
            instructions: vec![wi_2, wi_1, other],
            ..StoreSnapshot::default()
        });
        let truck = Device::truck("T01", Point::ORIGIN);

        let commands = PendingInstructionDispatch.on_device_idle(&truck, &store, 0);
        assert_eq!(
            commands,
            vec![
                Command::AssignTask {
                    device_id: "T01".into(),
                    wi_ref: "WI-2".into(),
                },
                Command::Move {
                    truck_id: "T01".into(),
                    waypoints: vec![Point::new(30.0, 0.0)],
                },
            ]
        );
    }

    #[test]
    fn cranes_get_no_commands() {
        let store = GlobalStore::new();
        let crane = Device::yard_crane("YC1", Point::ORIGIN, 0);
        assert!(PendingInstructionDispatch.on_device_idle(&crane, &store, 0).is_empty());
    }
}
