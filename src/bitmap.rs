//! Bitmap allocator shared by the inode and data-block allocators. Each
//! instance is a thin, stateless view over `(start_block, total_bits)`
//! inside the block device; it owns no memory of its own.

use crate::block::BlockDevice;
use crate::error::Result;

/// A bitmap region starting at block `start_block`, covering `total_bits`
/// bits (inode numbers or data-block numbers).
pub struct Bitmap {
    pub start_block: u32,
    pub total_bits: u32,
}

impl Bitmap {
    pub fn new(start_block: u32, total_bits: u32) -> Self {
        Self { start_block, total_bits }
    }

    fn bits_per_block(dev: &BlockDevice) -> u32 {
        dev.block_size() * 8
    }

    /// Scans forward from `start_bit`, returning the first clear bit whose
    /// index is `< total_bits`, or `None` if every remaining bit is set.
    pub fn find_free_from(&self, dev: &mut BlockDevice, start_bit: u32) -> Result<Option<u32>> {
        if start_bit >= self.total_bits {
            return Ok(None);
        }
        let bits_per_block = Self::bits_per_block(dev);
        let blocks_in_bitmap = crate::util::ceil_division(self.total_bits as u64, bits_per_block as u64) as u32;
        let start_block_idx = start_bit / bits_per_block;

        let mut buf = dev.new_block_buf();
        for i in start_block_idx..blocks_in_bitmap {
            dev.read_block(self.start_block + i, &mut buf)?;
            let start_bit_in_block = if i == start_block_idx { start_bit % bits_per_block } else { 0 };
            let start_byte = (start_bit_in_block / 8) as usize;
            for (byte_idx, byte) in buf.iter().enumerate().skip(start_byte) {
                if *byte == 0xFF {
                    continue;
                }
                let start_bit_in_byte = if byte_idx == start_byte { start_bit_in_block % 8 } else { 0 };
                for bit in start_bit_in_byte..8 {
                    if byte & (1 << bit) == 0 {
                        let bit_num = i * bits_per_block + byte_idx as u32 * 8 + bit;
                        if bit_num < self.total_bits {
                            return Ok(Some(bit_num));
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    /// Sets or clears bit `bit_num`.
    pub fn set(&self, dev: &mut BlockDevice, bit_num: u32, value: bool) -> Result<()> {
        let bits_per_block = Self::bits_per_block(dev);
        let block_idx = bit_num / bits_per_block;
        let byte_in_block = ((bit_num % bits_per_block) / 8) as usize;
        let bit_in_byte = bit_num % 8;
        log::trace!("bitmap set: bit {bit_num} -> {value}");

        let mut buf = dev.new_block_buf();
        dev.read_block(self.start_block + block_idx, &mut buf)?;
        if value {
            buf[byte_in_block] |= 1 << bit_in_byte;
        } else {
            buf[byte_in_block] &= !(1 << bit_in_byte);
        }
        dev.write_block(self.start_block + block_idx, &buf)
    }

    /// Sets every bit in `[0, end)` and clears the rest. Used once at
    /// format time to mark the metadata region of the block bitmap.
    pub fn fill_up_to(&self, dev: &mut BlockDevice, end: u32) -> Result<()> {
        let bits_per_block = Self::bits_per_block(dev);
        let blocks_in_bitmap = crate::util::ceil_division(self.total_bits as u64, bits_per_block as u64) as u32;
        let mut buf = dev.new_block_buf();
        for i in 0..blocks_in_bitmap {
            let block_base_bit = i * bits_per_block;
            for byte_idx in 0..buf.len() {
                let mut byte = 0u8;
                for bit in 0..8u32 {
                    let bit_num = block_base_bit + byte_idx as u32 * 8 + bit;
                    if bit_num < end {
                        byte |= 1 << bit;
                    }
                }
                buf[byte_idx] = byte;
            }
            dev.write_block(self.start_block + i, &buf)?;
        }
        Ok(())
    }

    /// Counts the number of set bits within `[0, total_bits)`.
    pub fn count_set(&self, dev: &mut BlockDevice) -> Result<u32> {
        let bits_per_block = Self::bits_per_block(dev);
        let blocks_in_bitmap = crate::util::ceil_division(self.total_bits as u64, bits_per_block as u64) as u32;
        let mut count = 0u32;
        let mut buf = dev.new_block_buf();
        for i in 0..blocks_in_bitmap {
            dev.read_block(self.start_block + i, &mut buf)?;
            for (byte_idx, byte) in buf.iter().enumerate() {
                for bit in 0..8u32 {
                    if byte & (1 << bit) != 0 {
                        let bit_num = i * bits_per_block + byte_idx as u32 * 8 + bit;
                        if bit_num < self.total_bits {
                            count += 1;
                        }
                    }
                }
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_dev(blocks: u32, block_size: u32) -> BlockDevice {
        let file = tempfile::tempfile().unwrap();
        file.set_len(blocks as u64 * block_size as u64).unwrap();
        BlockDevice::new(file, block_size)
    }

    #[test]
    fn find_set_count() {
        let mut dev = fresh_dev(2, 64);
        let bm = Bitmap::new(0, 100);

        assert_eq!(bm.find_free_from(&mut dev, 0).unwrap(), Some(0));
        bm.set(&mut dev, 0, true).unwrap();
        assert_eq!(bm.find_free_from(&mut dev, 0).unwrap(), Some(1));
        bm.set(&mut dev, 5, true).unwrap();
        assert_eq!(bm.count_set(&mut dev).unwrap(), 2);

        bm.set(&mut dev, 0, false).unwrap();
        assert_eq!(bm.count_set(&mut dev).unwrap(), 1);
    }

    #[test]
    fn find_free_from_respects_total_bits() {
        let mut dev = fresh_dev(1, 8);
        let bm = Bitmap::new(0, 10);
        bm.fill_up_to(&mut dev, 10).unwrap();
        assert_eq!(bm.find_free_from(&mut dev, 0).unwrap(), None);
        assert_eq!(bm.count_set(&mut dev).unwrap(), 10);
    }

    #[test]
    fn fill_up_to_marks_only_prefix() {
        let mut dev = fresh_dev(1, 8);
        let bm = Bitmap::new(0, 40);
        bm.fill_up_to(&mut dev, 5).unwrap();
        assert_eq!(bm.count_set(&mut dev).unwrap(), 5);
        assert_eq!(bm.find_free_from(&mut dev, 0).unwrap(), Some(5));
    }
}
