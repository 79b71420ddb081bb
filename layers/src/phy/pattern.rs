//! TDD/FDD slot-pattern structure generation
//!
//! From a repeating slot pattern and the timing parameters N0, N2, N1 and
//! the L1/L2 control latency, this module derives the per-slot work lists
//! the cell needs ahead of time: in which slot each DL/UL DCI must be sent,
//! in which slot it must be generated, and in which slot the DL HARQ
//! feedback for every data slot will arrive.

use std::collections::BTreeMap;

use tracing::debug;

use common::types::SlotType;
use common::utils::modulo;

/// Slot index -> list of k values (k0 for DL, k2 for UL) handled there
pub type DciMap = BTreeMap<u32, Vec<u32>>;

/// Everything derived from one pattern
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotStructures {
    /// DCI-send slot -> k0 list for DL data slots served from there
    pub to_send_dl: DciMap,
    /// DCI-send slot -> k2 list for UL data slots served from there
    pub to_send_ul: DciMap,
    /// Generation slot (send slot minus control latency) -> k0+latency list
    pub generate_dl: DciMap,
    /// Generation slot (send slot minus control latency) -> k2+latency list
    pub generate_ul: DciMap,
    /// DL data slot -> k1 (slots until its HARQ feedback can be sent)
    pub dl_harq_fb: BTreeMap<u32, u32>,
}

/// True when the pattern carries at least one DL-capable slot
pub fn has_dl_slot(pattern: &[SlotType]) -> bool {
    pattern
        .iter()
        .any(|&s| matches!(s, SlotType::F | SlotType::Dl | SlotType::S))
}

/// True when the pattern carries at least one UL-capable slot
pub fn has_ul_slot(pattern: &[SlotType]) -> bool {
    pattern
        .iter()
        .any(|&s| matches!(s, SlotType::F | SlotType::Ul | SlotType::S))
}

/// A pattern is TDD when it contains a flexible slot, or both directions.
/// A single-direction pattern describes one band of an FDD pair.
pub fn is_tdd(pattern: &[SlotType]) -> bool {
    let mut an_ul = false;
    let mut a_dl = false;

    for &s in pattern {
        match s {
            SlotType::F => return true,
            SlotType::Ul => an_ul = true,
            SlotType::Dl => a_dl = true,
            SlotType::S => {}
        }
    }

    !(an_ul ^ a_dl)
}

/// Return k1: after how many slots the DL HARQ feedback for the data sent
/// at `pos` can go out. Scans forward from pos+n1 until an UL-capable slot
/// (S, F or UL) is found, wrapping around the pattern.
fn return_harq_slot(pattern: &[SlotType], pos: u32, n1: u32) -> u32 {
    let n = pattern.len() as u32;
    let mut k1 = n1;
    let mut index = modulo(i64::from(pos) + i64::from(k1), n);

    while pattern[index as usize] < SlotType::S {
        k1 += 1;
        index = modulo(i64::from(pos) + i64::from(k1), n);
        assert!(
            k1 <= n1 + n,
            "Pattern has no slot able to carry HARQ feedback"
        );
    }

    k1
}

/// The slot in which a DCI has to be sent, with its k0/k2 distance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DciSlot {
    index: u32,
    k: u32,
}

/// Return the slot in which the DCI for the data at `pos` must be sent,
/// looking backward at least `n` slots (n = N0 for DL, N2 for UL) until a
/// DL-capable slot (DL, S or F) is found, wrapping around the pattern.
fn return_dci_slot(pattern: &[SlotType], pos: u32, n: u32) -> DciSlot {
    let len = pattern.len() as u32;
    let mut ret = DciSlot { index: 0, k: n };
    ret.index = modulo(i64::from(pos) - i64::from(ret.k), len);

    while pattern[ret.index as usize] > SlotType::F {
        ret.k += 1;
        ret.index = modulo(i64::from(pos) - i64::from(ret.k), len);
        assert!(ret.k <= n + len, "Pattern has no slot able to carry DCI");
    }

    ret
}

/// Fill the to-send and generate maps for the data slot at `pos`
fn generate_dci_maps(
    pattern: &[SlotType],
    to_send: &mut DciMap,
    generate: &mut DciMap,
    pos: u32,
    n: u32,
    l1l2_ctrl_latency: u32,
) {
    let len = pattern.len() as u32;
    let dci_slot = return_dci_slot(pattern, pos, n);
    let index_gen = modulo(
        i64::from(dci_slot.index) - i64::from(l1l2_ctrl_latency),
        len,
    );
    let k_with_latency = dci_slot.k + l1l2_ctrl_latency;

    to_send.entry(dci_slot.index).or_default().push(dci_slot.k);
    generate.entry(index_gen).or_default().push(k_with_latency);
}

/// Derive all slot structures from a pattern.
///
/// For an FDD pattern (single direction, no flexible slots) the generation
/// runs against an all-flexible pattern of the same length, as the paired
/// band handles the opposite direction; afterwards the generate map of the
/// direction this band does not carry is dropped. The to-send maps are kept
/// in both cases, as feedback and DCIs still flow through this band.
pub fn generate_structures(
    pattern: &[SlotType],
    n0: u32,
    n2: u32,
    n1: u32,
    l1l2_ctrl_latency: u32,
) -> SlotStructures {
    assert!(!pattern.is_empty(), "Empty slot pattern");

    let fdd_generation_pattern = vec![SlotType::F; pattern.len()];
    let generation_pattern: &[SlotType] = if is_tdd(pattern) {
        pattern
    } else {
        &fdd_generation_pattern
    };

    let mut out = SlotStructures::default();

    for i in 0..generation_pattern.len() as u32 {
        match generation_pattern[i as usize] {
            SlotType::Ul => {
                generate_dci_maps(
                    generation_pattern,
                    &mut out.to_send_ul,
                    &mut out.generate_ul,
                    i,
                    n2,
                    l1l2_ctrl_latency,
                );
            }
            SlotType::Dl | SlotType::S => {
                generate_dci_maps(
                    generation_pattern,
                    &mut out.to_send_dl,
                    &mut out.generate_dl,
                    i,
                    n0,
                    l1l2_ctrl_latency,
                );

                let k1 = return_harq_slot(generation_pattern, i, n1);
                out.dl_harq_fb.insert(i, k1);
            }
            SlotType::F => {
                generate_dci_maps(
                    generation_pattern,
                    &mut out.to_send_dl,
                    &mut out.generate_dl,
                    i,
                    n0,
                    l1l2_ctrl_latency,
                );
                generate_dci_maps(
                    generation_pattern,
                    &mut out.to_send_ul,
                    &mut out.generate_ul,
                    i,
                    n2,
                    l1l2_ctrl_latency,
                );

                let k1 = return_harq_slot(generation_pattern, i, n1);
                out.dl_harq_fb.insert(i, k1);
            }
        }
    }

    if !is_tdd(pattern) {
        if has_ul_slot(pattern) {
            out.generate_dl.clear();
        } else {
            out.generate_ul.clear();
        }
    }

    for list in out.generate_ul.values_mut() {
        list.sort();
    }
    for list in out.generate_dl.values_mut() {
        list.sort();
    }

    debug!(
        to_send_dl = out.to_send_dl.len(),
        to_send_ul = out.to_send_ul.len(),
        generate_dl = out.generate_dl.len(),
        generate_ul = out.generate_ul.len(),
        "Generated slot structures"
    );

    out
}
