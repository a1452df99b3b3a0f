//! Argument block layout for every launch mode.
//!
//! A binary-launch block is a table of 8-byte device pointers followed by the inline
//! tiling bytes and then the const tensor payloads:
//!
//! ```text
//! [ slot 0 .. slot n-2 | tiling slot ][ tiling (align64) ][ const tensors ]
//! ```
//!
//! Slots claimed by the hardware-sync index and const tensors are fixed. Inputs,
//! outputs and scratch buffers fill the remaining slots in order.
//!
//! An indexed block is a run of 8-byte words holding one descriptor per entry, each
//! starting at the word named by [`KernelInfo::args_index`]:
//!
//! ```text
//! hwsync   [ addr ]
//! tensor   [ addr | addr | offset | sizes.. | strides.. ]
//! scratch  [ addr | addr | 0 | bytes | 1 ]
//! tiling   [ addr | addr | 0 | words | 1 ]
//! ```

use smallvec::{smallvec, SmallVec};

use super::info::{align64, KernelInfo};
use crate::device::{HostInputInfo, TilingOffsets};
use crate::error::{DispatchError, DispatchResult};
use crate::launch::{LaunchParam, RunInfo};
use crate::tensor::Tensor;

const SLOT_LEN: usize = 8;
const BUFFER_DESC_WORDS: u64 = 5;

type Descriptor = SmallVec<[u64; 11]>;

/// Sizes computed during Init; Run refuses a launch param that no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgsLayout {
    pub inputs: usize,
    pub outputs: usize,
    pub arg_count: usize,
    pub size: u64,
}

impl ArgsLayout {
    pub fn table_len(&self) -> usize {
        self.arg_count * SLOT_LEN
    }
}

pub fn binary_layout(info: &KernelInfo, inputs: usize, outputs: usize) -> ArgsLayout {
    let arg_count = inputs
        + outputs
        + info.const_tensors().len()
        + info.scratch_sizes().len()
        + usize::from(info.hwsync_index().is_some())
        + 1;
    let table = (arg_count * SLOT_LEN) as u64;
    let size = if info.launch_with_tiling() {
        let tail = info.tiling_size().saturating_sub(info.const_tensor_offset());
        table + align64(info.tiling_used_size()) + tail
    } else {
        table
    };
    ArgsLayout {
        inputs,
        outputs,
        arg_count,
        size,
    }
}

pub fn symbol_layout(inputs: usize, outputs: usize, so_name: &str, kernel_name: &str) -> ArgsLayout {
    let arg_count = inputs + outputs;
    let size = (arg_count * SLOT_LEN + so_name.len() + 1 + kernel_name.len() + 1) as u64;
    ArgsLayout {
        inputs,
        outputs,
        arg_count,
        size,
    }
}

fn tensor_words(tensor: &Tensor) -> u64 {
    3 + 2 * tensor.dims().len() as u64
}

/// Descriptor length in words for every indexed entry, in block order.
fn indexed_entry_words(info: &KernelInfo, param: &LaunchParam) -> SmallVec<[u64; 16]> {
    let mut words = SmallVec::new();
    if info.hwsync_index().is_some() {
        words.push(1);
    }
    words.extend(
        param
            .in_tensors()
            .iter()
            .chain(param.out_tensors())
            .map(tensor_words),
    );
    words.extend(info.scratch_sizes().iter().map(|_| BUFFER_DESC_WORDS));
    words.push(BUFFER_DESC_WORDS);
    words
}

/// Packs the indexed descriptors back to back from word 0.
pub fn default_args_index(info: &KernelInfo, param: &LaunchParam) -> SmallVec<[u64; 16]> {
    let mut next = 0u64;
    indexed_entry_words(info, param)
        .into_iter()
        .map(|words| {
            let start = next;
            next += words;
            start
        })
        .collect()
}

/// Returns the word count the entries span, refusing overlapping or misordered entries.
fn check_index(index: &[u64], words: &[u64]) -> DispatchResult<u64> {
    if index.len() != words.len() {
        return Err(DispatchError::validation(format!(
            "args index has {} entries, the kernel uses {}",
            index.len(),
            words.len()
        )));
    }
    let mut end = 0u64;
    for (pos, (start, len)) in index.iter().zip(words).enumerate() {
        if *start < end {
            return Err(DispatchError::validation(format!(
                "args index entry {pos} at word {start} overlaps the previous entry ending at {end}"
            )));
        }
        end = start
            .checked_add(*len)
            .ok_or_else(|| DispatchError::validation("args index overflows"))?;
    }
    Ok(end)
}

pub fn indexed_layout(info: &KernelInfo, param: &LaunchParam) -> DispatchResult<ArgsLayout> {
    let words = indexed_entry_words(info, param);
    let end = check_index(info.args_index(), &words)?;
    let arg_count = usize::try_from(end)
        .map_err(|_| DispatchError::validation(format!("args index ends at word {end}")))?;
    Ok(ArgsLayout {
        inputs: param.in_count(),
        outputs: param.out_count(),
        arg_count,
        size: end.saturating_mul(SLOT_LEN as u64),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BinaryArgs {
    pub host_inputs: SmallVec<[HostInputInfo; 4]>,
    pub tiling: Option<TilingOffsets>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SymbolArgs {
    pub so_name_offset: u32,
    pub kernel_name_offset: u32,
}

fn offset_u32(value: u64) -> DispatchResult<u32> {
    u32::try_from(value)
        .map_err(|_| DispatchError::programming(format!("argument offset {value} exceeds u32")))
}

fn put_slot(args: &mut [u8], slot: usize, value: u64) {
    let start = slot * SLOT_LEN;
    args[start..start + SLOT_LEN].copy_from_slice(&value.to_ne_bytes());
}

/// Reads back the pointer written to `slot`.
pub(crate) fn slot_value(args: &[u8], slot: usize) -> Option<u64> {
    let start = slot.checked_mul(SLOT_LEN)?;
    let bytes = args.get(start..start + SLOT_LEN)?;
    let mut raw = [0u8; SLOT_LEN];
    raw.copy_from_slice(bytes);
    Some(u64::from_ne_bytes(raw))
}

fn claim(occupied: &mut [bool], index: u64, what: &str) -> DispatchResult<usize> {
    let slot = usize::try_from(index).unwrap_or(usize::MAX);
    match occupied.get_mut(slot) {
        Some(taken) if !*taken => {
            *taken = true;
            Ok(slot)
        }
        Some(_) => Err(DispatchError::validation(format!(
            "{what} argument slot {index} is already taken"
        ))),
        None => Err(DispatchError::validation(format!(
            "{what} argument slot {index} is outside the {} slot table",
            occupied.len()
        ))),
    }
}

fn device_addr(base: u64, offset: u64, what: &str) -> DispatchResult<u64> {
    base.checked_add(offset).ok_or_else(|| {
        DispatchError::validation(format!("{what} address {base:#x} + {offset} overflows"))
    })
}

fn check_size(args: &[u8], layout: &ArgsLayout) -> DispatchResult<()> {
    if args.len() as u64 != layout.size {
        return Err(DispatchError::programming(format!(
            "argument block holds {} bytes, layout needs {}",
            args.len(),
            layout.size
        )));
    }
    Ok(())
}

pub(crate) fn fill_binary(
    args: &mut [u8],
    info: &KernelInfo,
    layout: &ArgsLayout,
    param: &LaunchParam,
    run_info: &RunInfo,
    hwsync_addr: Option<u64>,
) -> DispatchResult<BinaryArgs> {
    check_size(args, layout)?;
    let table = layout.table_len();
    args[..table].fill(0);

    let mut occupied = vec![false; layout.arg_count];
    let tiling_slot = layout.arg_count - 1;
    occupied[tiling_slot] = true;

    if let Some(index) = info.hwsync_index() {
        let slot = claim(&mut occupied, index, "hwsync")?;
        let addr = hwsync_addr
            .ok_or_else(|| DispatchError::programming("hwsync slot without a sync address"))?;
        put_slot(args, slot, addr);
    }

    let const_base = table as u64 + align64(info.tiling_used_size());
    let mut out = BinaryArgs::default();
    let mut cursor = 0u64;
    for tensor in info.const_tensors() {
        let slot = claim(&mut occupied, tensor.arg_index, "const tensor")?;
        if info.launch_with_tiling() {
            out.host_inputs.push(HostInputInfo {
                addr_offset: offset_u32((slot * SLOT_LEN) as u64)?,
                data_offset: offset_u32(const_base + cursor)?,
            });
        } else {
            let base = run_info.tiling_device_addr.ok_or_else(|| {
                DispatchError::validation("const tensors need a tiling device address")
            })?;
            let offset = info
                .const_tensor_offset()
                .checked_add(cursor)
                .ok_or_else(|| DispatchError::validation("const tensor offset overflows"))?;
            put_slot(args, slot, device_addr(base, offset, "const tensor")?);
        }
        cursor = cursor
            .checked_add(tensor.size)
            .ok_or_else(|| DispatchError::validation("const tensor sizes overflow"))?;
    }

    let mut pointers: SmallVec<[u64; 16]> = param
        .in_tensors()
        .iter()
        .chain(param.out_tensors())
        .map(|tensor| tensor.data.unwrap_or(0))
        .collect();
    if !info.scratch_sizes().is_empty() {
        let base = run_info
            .scratch_addr
            .ok_or_else(|| DispatchError::validation("kernel needs scratch but none was given"))?;
        let mut offset = 0u64;
        for size in info.scratch_sizes() {
            pointers.push(device_addr(base, offset, "scratch")?);
            offset = offset
                .checked_add(*size)
                .ok_or_else(|| DispatchError::validation("scratch sizes overflow"))?;
        }
    }

    let free: SmallVec<[usize; 16]> = (0..layout.arg_count).filter(|i| !occupied[*i]).collect();
    if free.len() != pointers.len() {
        return Err(DispatchError::programming(format!(
            "{} free argument slots for {} pointers",
            free.len(),
            pointers.len()
        )));
    }
    for (slot, pointer) in free.into_iter().zip(pointers) {
        put_slot(args, slot, pointer);
    }

    if info.launch_with_tiling() {
        let used = info.tiling_used_size() as usize;
        let host = info.tiling_host();
        args[table..table + used].copy_from_slice(&host[..used]);
        let tail = &host[(info.const_tensor_offset() as usize).min(host.len())..];
        let start = const_base as usize;
        args[start..start + tail.len()].copy_from_slice(tail);
        out.tiling = Some(TilingOffsets {
            addr_offset: offset_u32((tiling_slot * SLOT_LEN) as u64)?,
            data_offset: offset_u32(table as u64)?,
        });
    } else {
        put_slot(args, tiling_slot, device_tiling_addr(info, run_info)?);
    }
    Ok(out)
}

fn device_tiling_addr(info: &KernelInfo, run_info: &RunInfo) -> DispatchResult<u64> {
    match run_info.tiling_device_addr {
        Some(addr) => Ok(addr),
        None if info.tiling_size() == 0 => Ok(0),
        None => Err(DispatchError::validation(
            "kernel tiling lives on the device but no tiling address was given",
        )),
    }
}

fn tensor_descriptor(tensor: &Tensor) -> Descriptor {
    let addr = tensor.data.unwrap_or(0);
    let dims = tensor.dims();
    let mut desc: Descriptor = smallvec![addr, addr, tensor.desc.offset as u64];
    desc.extend(dims.iter().map(|dim| *dim as u64));
    match &tensor.desc.strides {
        Some(strides) if strides.len() == dims.len() => {
            desc.extend(strides.iter().map(|stride| *stride as u64));
        }
        _ => {
            // row-major
            let mut strides: SmallVec<[u64; 8]> = smallvec![1; dims.len()];
            for axis in (0..dims.len().saturating_sub(1)).rev() {
                strides[axis] = strides[axis + 1].wrapping_mul(dims[axis + 1] as u64);
            }
            desc.extend(strides);
        }
    }
    desc
}

fn buffer_descriptor(addr: u64, len: u64) -> Descriptor {
    smallvec![addr, addr, 0, len, 1]
}

pub(crate) fn fill_indexed(
    args: &mut [u8],
    info: &KernelInfo,
    layout: &ArgsLayout,
    param: &LaunchParam,
    run_info: &RunInfo,
    hwsync_addr: Option<u64>,
) -> DispatchResult<()> {
    check_size(args, layout)?;
    let index = info.args_index();
    let end = check_index(index, &indexed_entry_words(info, param))?;
    if end > layout.arg_count as u64 {
        return Err(DispatchError::validation(format!(
            "descriptors need {end} words, the argument block holds {}",
            layout.arg_count
        )));
    }

    let mut descriptors: SmallVec<[Descriptor; 8]> = SmallVec::new();
    if info.hwsync_index().is_some() {
        let addr = hwsync_addr
            .ok_or_else(|| DispatchError::programming("hwsync entry without a sync address"))?;
        descriptors.push(smallvec![addr]);
    }
    descriptors.extend(
        param
            .in_tensors()
            .iter()
            .chain(param.out_tensors())
            .map(tensor_descriptor),
    );
    if !info.scratch_sizes().is_empty() {
        let base = run_info
            .scratch_addr
            .ok_or_else(|| DispatchError::validation("kernel needs scratch but none was given"))?;
        let mut offset = 0u64;
        for size in info.scratch_sizes() {
            descriptors.push(buffer_descriptor(device_addr(base, offset, "scratch")?, *size));
            offset = offset
                .checked_add(*size)
                .ok_or_else(|| DispatchError::validation("scratch sizes overflow"))?;
        }
    }
    let tiling_words = info.tiling_size() / SLOT_LEN as u64;
    descriptors.push(buffer_descriptor(device_tiling_addr(info, run_info)?, tiling_words));

    args.fill(0);
    for (start, descriptor) in index.iter().zip(&descriptors) {
        for (word, value) in descriptor.iter().enumerate() {
            put_slot(args, *start as usize + word, *value);
        }
    }
    Ok(())
}

pub(crate) fn fill_symbol(
    args: &mut [u8],
    layout: &ArgsLayout,
    param: &LaunchParam,
    so_name: &str,
    kernel_name: &str,
) -> DispatchResult<SymbolArgs> {
    check_size(args, layout)?;
    let table = layout.table_len();
    args.fill(0);
    for (slot, tensor) in param
        .in_tensors()
        .iter()
        .chain(param.out_tensors())
        .enumerate()
    {
        put_slot(args, slot, tensor.data.unwrap_or(0));
    }
    let so_start = table;
    let kernel_start = so_start + so_name.len() + 1;
    args[so_start..so_start + so_name.len()].copy_from_slice(so_name.as_bytes());
    args[kernel_start..kernel_start + kernel_name.len()].copy_from_slice(kernel_name.as_bytes());
    Ok(SymbolArgs {
        so_name_offset: offset_u32(so_start as u64)?,
        kernel_name_offset: offset_u32(kernel_start as u64)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{DType, Format, Tensor, TensorDesc};

    fn tensor(addr: Option<u64>) -> Tensor {
        let mut t = Tensor::new(TensorDesc::new(DType::Float16, Format::Nd, &[4]));
        t.data = addr;
        t.data_size = 8;
        t
    }

    fn param(inputs: &[Option<u64>], outputs: &[Option<u64>]) -> LaunchParam {
        let mut param = LaunchParam::new();
        for addr in inputs {
            param.add_in_tensor(tensor(*addr));
        }
        for addr in outputs {
            param.add_out_tensor(tensor(*addr));
        }
        param
    }

    #[test]
    fn binary_layout_counts_every_slot_kind() {
        let mut info = KernelInfo::new();
        info.alloc_tiling(100).unwrap();
        info.set_const_tensor_offset(40).unwrap();
        info.add_const_tensor(1, &[1u8; 10]).unwrap();
        info.add_scratch(32);
        info.set_hwsync_index(0);

        let layout = binary_layout(&info, 2, 1);
        // 2 in + 1 out + 1 const + 1 scratch + hwsync + tiling
        assert_eq!(layout.arg_count, 7);
        assert_eq!(layout.size, 7 * 8 + 64 + (100 - 40));
    }

    #[test]
    fn binary_fill_places_fixed_slots_first() {
        let mut info = KernelInfo::new();
        info.alloc_tiling(16).unwrap();
        info.write_tiling(&[0xAAu8; 16]).unwrap();
        info.set_hwsync_index(1);
        info.add_scratch(16);
        info.add_scratch(32);

        let param = param(&[Some(0x1000), None], &[Some(0x2000)]);
        let layout = binary_layout(&info, 2, 1);
        assert_eq!(layout.arg_count, 7);
        let mut args = vec![0xFF; layout.size as usize];
        let run = RunInfo::default().with_scratch(0x9000);
        let out = fill_binary(&mut args, &info, &layout, &param, &run, Some(0x77)).unwrap();

        let slots: Vec<u64> = (0..7).map(|i| slot_value(&args, i).unwrap()).collect();
        assert_eq!(slots, vec![0x1000, 0x77, 0, 0x2000, 0x9000, 0x9010, 0]);
        assert_eq!(
            out.tiling,
            Some(TilingOffsets {
                addr_offset: 48,
                data_offset: 56
            })
        );
        assert_eq!(&args[56..72], &[0xAA; 16]);
        assert!(out.host_inputs.is_empty());
    }

    #[test]
    fn const_tensors_become_host_inputs() {
        let mut info = KernelInfo::new();
        info.alloc_tiling(256).unwrap();
        info.set_tiling_used_size(8).unwrap();
        info.set_const_tensor_offset(64).unwrap();
        info.add_const_tensor(0, &[5u32; 4]).unwrap();
        info.add_const_tensor(2, &[6u32; 4]).unwrap();

        let param = param(&[Some(0x10)], &[]);
        let layout = binary_layout(&info, 1, 0);
        assert_eq!(layout.arg_count, 4);
        let mut args = vec![0; layout.size as usize];
        let out =
            fill_binary(&mut args, &info, &layout, &param, &RunInfo::default(), None).unwrap();

        let base = 4 * 8 + 64;
        assert_eq!(
            out.host_inputs.as_slice(),
            &[
                HostInputInfo {
                    addr_offset: 0,
                    data_offset: base
                },
                HostInputInfo {
                    addr_offset: 16,
                    data_offset: base + 128
                },
            ]
        );
        assert_eq!(slot_value(&args, 1), Some(0x10));
        assert_eq!(&args[base as usize..base as usize + 4], &5u32.to_ne_bytes());
    }

    #[test]
    fn device_tiling_goes_into_last_slot() {
        let mut info = KernelInfo::new();
        info.set_launch_with_tiling(false);
        info.set_external_tiling(vec![0; 8]).unwrap();
        let param = param(&[Some(1)], &[Some(2)]);
        let layout = binary_layout(&info, 1, 1);
        assert_eq!(layout.size, 3 * 8);

        let mut args = vec![0; layout.size as usize];
        let missing = fill_binary(&mut args, &info, &layout, &param, &RunInfo::default(), None);
        assert!(matches!(missing, Err(DispatchError::Validation(_))));

        let run = RunInfo::default().with_tiling_device_addr(0xBEEF);
        let out = fill_binary(&mut args, &info, &layout, &param, &run, None).unwrap();
        assert_eq!(out.tiling, None);
        assert_eq!(slot_value(&args, 2), Some(0xBEEF));
    }

    #[test]
    fn scratch_addresses_past_u64_max_are_rejected() {
        let mut info = KernelInfo::new();
        info.alloc_tiling(8).unwrap();
        info.set_scratch_sizes(&[64, 64]);
        let param = param(&[Some(1)], &[]);
        let layout = binary_layout(&info, 1, 0);
        let mut args = vec![0; layout.size as usize];
        let run = RunInfo::default().with_scratch(u64::MAX - 8);
        let err = fill_binary(&mut args, &info, &layout, &param, &run, None);
        assert!(matches!(err, Err(DispatchError::Validation(_))), "{err:?}");
    }

    #[test]
    fn const_tensor_addresses_past_u64_max_are_rejected() {
        let mut info = KernelInfo::new();
        info.set_launch_with_tiling(false);
        info.set_external_tiling(vec![0; 256]).unwrap();
        info.set_const_tensor_offset(64).unwrap();
        info.add_const_tensor(0, &[1u32; 4]).unwrap();
        let param = param(&[], &[]);
        let layout = binary_layout(&info, 0, 0);
        let mut args = vec![0; layout.size as usize];
        let run = RunInfo::default().with_tiling_device_addr(u64::MAX - 16);
        let err = fill_binary(&mut args, &info, &layout, &param, &run, None);
        assert!(matches!(err, Err(DispatchError::Validation(_))), "{err:?}");
    }

    #[test]
    fn conflicting_slots_are_rejected() {
        let mut info = KernelInfo::new();
        info.alloc_tiling(128).unwrap();
        info.set_const_tensor_offset(8).unwrap();
        info.set_hwsync_index(0);
        info.add_const_tensor(0, &[1u8]).unwrap();
        let param = param(&[Some(1)], &[]);
        let layout = binary_layout(&info, 1, 0);
        let mut args = vec![0; layout.size as usize];
        let err = fill_binary(&mut args, &info, &layout, &param, &RunInfo::default(), Some(1));
        assert!(matches!(err, Err(DispatchError::Validation(_))));
    }

    fn word(args: &[u8], start: usize, len: usize) -> Vec<u64> {
        (start..start + len).map(|i| slot_value(args, i).unwrap()).collect()
    }

    #[test]
    fn indexed_layout_packs_descriptors_in_order() {
        let mut info = KernelInfo::new();
        info.set_launch_with_tiling(false);
        info.set_external_tiling(vec![0; 16]).unwrap();
        info.set_hwsync_index(0);
        info.add_scratch(64);
        let param = param(&[Some(0x1000), Some(0x2000)], &[Some(0x3000)]);

        let index = default_args_index(&info, &param);
        // hwsync, in0, in1, out0, scratch, tiling
        assert_eq!(index.as_slice(), &[0, 1, 6, 11, 16, 21]);
        info.set_args_index(&index);
        let layout = indexed_layout(&info, &param).unwrap();
        assert_eq!(layout.arg_count, 26);
        assert_eq!(layout.size, 26 * 8);

        let mut args = vec![0xFF; layout.size as usize];
        let run = RunInfo::default()
            .with_scratch(0x9000)
            .with_tiling_device_addr(0xB000);
        fill_indexed(&mut args, &info, &layout, &param, &run, Some(0x77)).unwrap();
        assert_eq!(word(&args, 0, 1), vec![0x77]);
        assert_eq!(word(&args, 1, 5), vec![0x1000, 0x1000, 0, 4, 1]);
        assert_eq!(word(&args, 6, 2), vec![0x2000, 0x2000]);
        assert_eq!(word(&args, 11, 2), vec![0x3000, 0x3000]);
        assert_eq!(word(&args, 16, 5), vec![0x9000, 0x9000, 0, 64, 1]);
        assert_eq!(word(&args, 21, 5), vec![0xB000, 0xB000, 0, 2, 1]);
    }

    #[test]
    fn indexed_descriptors_carry_rank_and_strides() {
        let mut info = KernelInfo::new();
        info.set_launch_with_tiling(false);
        let mut param = LaunchParam::new();
        let mut matrix = Tensor::new(TensorDesc::new(DType::Float16, Format::Nd, &[3, 4, 5]));
        matrix.data = Some(0x40);
        param.add_in_tensor(matrix);

        info.set_args_index(&default_args_index(&info, &param));
        assert_eq!(info.args_index(), &[0, 9]);
        let layout = indexed_layout(&info, &param).unwrap();
        let mut args = vec![0; layout.size as usize];
        fill_indexed(&mut args, &info, &layout, &param, &RunInfo::default(), None).unwrap();
        assert_eq!(word(&args, 0, 9), vec![0x40, 0x40, 0, 3, 4, 5, 20, 5, 1]);
        // no tiling: a null buffer of zero words
        assert_eq!(word(&args, 9, 5), vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn explicit_args_index_is_checked() {
        let mut info = KernelInfo::new();
        info.set_launch_with_tiling(false);
        let param = param(&[Some(0xA)], &[]);

        info.set_args_index(&[0]);
        assert!(matches!(
            indexed_layout(&info, &param),
            Err(DispatchError::Validation(_))
        ));
        // input needs five words
        info.set_args_index(&[0, 3]);
        assert!(matches!(
            indexed_layout(&info, &param),
            Err(DispatchError::Validation(_))
        ));

        info.set_args_index(&[2, 9]);
        let layout = indexed_layout(&info, &param).unwrap();
        assert_eq!(layout.size, 14 * 8);
        let mut args = vec![0xFF; layout.size as usize];
        fill_indexed(&mut args, &info, &layout, &param, &RunInfo::default(), None).unwrap();
        assert_eq!(word(&args, 0, 3), vec![0, 0, 0xA]);
    }

    #[test]
    fn indexed_fill_refuses_a_grown_param() {
        let mut info = KernelInfo::new();
        info.set_launch_with_tiling(false);
        let small = param(&[Some(1)], &[]);
        info.set_args_index(&default_args_index(&info, &small));
        let layout = indexed_layout(&info, &small).unwrap();

        let mut grown = LaunchParam::new();
        let mut tensor = Tensor::new(TensorDesc::new(DType::Float16, Format::Nd, &[2, 2]));
        tensor.data = Some(1);
        grown.add_in_tensor(tensor);
        let mut args = vec![0; layout.size as usize];
        let err = fill_indexed(&mut args, &info, &layout, &grown, &RunInfo::default(), None);
        assert!(matches!(err, Err(DispatchError::Validation(_))), "{err:?}");
    }

    #[test]
    fn symbol_block_carries_names() {
        let param = param(&[Some(0xA), Some(0xB)], &[Some(0xC)]);
        let layout = symbol_layout(2, 1, "libk.so", "unpad");
        assert_eq!(layout.size, 24 + 8 + 6);
        let mut args = vec![0xFF; layout.size as usize];
        let out = fill_symbol(&mut args, &layout, &param, "libk.so", "unpad").unwrap();
        assert_eq!(out.so_name_offset, 24);
        assert_eq!(out.kernel_name_offset, 32);
        assert_eq!(slot_value(&args, 2), Some(0xC));
        assert_eq!(&args[24..32], b"libk.so\0");
        assert_eq!(&args[32..], b"unpad\0");
    }
}
