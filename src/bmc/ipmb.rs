//! IPMB address → slot mapping and slot → host IP derivation (§4.5).

use super::packet::{BoardInfo, SensorInfo, UdpInfo};

/// Bijective over the 14 known addresses; unknown addresses have no
/// slot and the caller skips that board.
pub fn ipmb_to_slot(addr: u8) -> Option<u32> {
    match addr {
        0x7c => Some(1),
        0x7a => Some(2),
        0x38 => Some(3),
        0x76 => Some(4),
        0x34 => Some(5),
        0x32 => Some(6),
        0x70 => Some(7),
        0x6e => Some(8),
        0x2c => Some(9),
        0x2a => Some(10),
        0x68 => Some(11),
        0x26 => Some(12),
        0x02 => Some(13),
        0x04 => Some(14),
        _ => None,
    }
}

const SLOTS_1_TO_7: [u32; 7] = [5, 37, 69, 101, 133, 170, 180];
const SLOTS_8_TO_12: [u32; 5] = [5, 37, 69, 101, 133];

/// Subnet = `2*box_id` for slots 1-7, `2*box_id+1` for slots 8-12;
/// unknown slot (13, 14, or out of range) logs a warning and uses
/// the subnet's default host `.5`.
pub fn host_ip(box_id: u8, slot_id: u32) -> String {
    let box_id = box_id as u32;
    match slot_id {
        1..=7 => format!("192.168.{}.{}", box_id * 2, SLOTS_1_TO_7[(slot_id - 1) as usize]),
        8..=12 => format!("192.168.{}.{}", box_id * 2 + 1, SLOTS_8_TO_12[(slot_id - 8) as usize]),
        _ => {
            tracing::warn!(slot_id, box_id, "unrecognized BMC slot id, defaulting to .5 on even subnet");
            format!("192.168.{}.5", box_id * 2)
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodedBoard {
    pub slot_id: u32,
    pub host_ip: String,
    pub ipmb_addr: u8,
    pub module_type: u16,
    pub bmc_company: u16,
    pub bmc_version: String,
    pub sensors: Vec<SensorInfo>,
}

/// Every valid board in a packet: `module_type == 0` boards are empty
/// slots and skipped; boards with an unrecognized IPMB address are
/// skipped with a warning (§4.5).
pub fn decode_boards(packet: &UdpInfo) -> Vec<DecodedBoard> {
    packet.boards.iter().filter_map(|board| decode_board(packet.box_id, board)).collect()
}

fn decode_board(box_id: u8, board: &BoardInfo) -> Option<DecodedBoard> {
    if board.module_type == 0 {
        return None;
    }
    let Some(slot_id) = ipmb_to_slot(board.ipmb_addr) else {
        tracing::warn!(ipmb_addr = board.ipmb_addr, "unrecognized IPMB address, skipping board");
        return None;
    };
    Some(DecodedBoard {
        slot_id,
        host_ip: host_ip(box_id, slot_id),
        ipmb_addr: board.ipmb_addr,
        module_type: board.module_type,
        bmc_company: board.bmc_company,
        bmc_version: board.bmc_version.clone(),
        sensors: board.sensors.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipmb_mapping_matches_documented_table() {
        assert_eq!(ipmb_to_slot(0x7c), Some(1));
        assert_eq!(ipmb_to_slot(0x04), Some(14));
        assert_eq!(ipmb_to_slot(0xff), None);
    }

    #[test]
    fn host_ip_low_slots_use_even_subnet() {
        assert_eq!(host_ip(3, 1), "192.168.6.5");
        assert_eq!(host_ip(3, 7), "192.168.6.180");
    }

    #[test]
    fn host_ip_high_slots_use_odd_subnet() {
        assert_eq!(host_ip(3, 8), "192.168.7.5");
        assert_eq!(host_ip(3, 12), "192.168.7.133");
    }

    #[test]
    fn host_ip_unknown_slot_defaults_to_dot_five() {
        assert_eq!(host_ip(3, 13), "192.168.6.5");
        assert_eq!(host_ip(3, 99), "192.168.6.5");
    }

    #[test]
    fn empty_module_skipped() {
        let packet = UdpInfo {
            seq_num: 0,
            msg_type: 0,
            timestamp: 0,
            box_name: 0,
            box_id: 1,
            fans: vec![],
            boards: vec![BoardInfo {
                ipmb_addr: 0x7c,
                module_type: 0,
                bmc_company: 0,
                bmc_version: String::new(),
                sensor_num: 0,
                sensors: vec![],
            }],
        };
        assert!(decode_boards(&packet).is_empty());
    }
}
