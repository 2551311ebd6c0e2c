/// Most-significant-bit-first cursor over a byte slice.
///
/// Legacy bitmap streams carry no terminator of their own, so this reader
/// never fails: reads past the end of the slice yield zero bits and
/// `bits_remaining` hits zero. Callers bound their loops by the pixel or
/// symbol count the surrounding header declared.
pub struct MsbBitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u32,
    bits_in_buf: u32,
}

impl<'a> MsbBitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buf: 0,
            bits_in_buf: 0,
        }
    }

    fn fill_buf(&mut self) {
        while self.bits_in_buf <= 24 && self.pos < self.data.len() {
            self.bit_buf = (self.bit_buf << 8) | u32::from(self.data[self.pos]);
            self.pos += 1;
            self.bits_in_buf += 8;
        }
    }

    /// Next `n` bits (n <= 16) without advancing, left-padded into the low
    /// bits of the result. Past the end of the data the missing low-order
    /// bits read as zero.
    pub fn peek_bits(&mut self, n: u32) -> u16 {
        debug_assert!(n <= 16);
        if n == 0 {
            return 0;
        }
        self.fill_buf();
        if self.bits_in_buf >= n {
            ((self.bit_buf >> (self.bits_in_buf - n)) & ((1 << n) - 1)) as u16
        } else {
            let have = self.bits_in_buf;
            let tail = if have == 0 {
                0
            } else {
                self.bit_buf & ((1 << have) - 1)
            };
            (tail << (n - have)) as u16
        }
    }

    /// Read and consume `n` bits (n <= 16), MSB first.
    pub fn get_bits(&mut self, n: u32) -> u16 {
        let value = self.peek_bits(n);
        self.bits_in_buf -= n.min(self.bits_in_buf);
        value
    }

    pub fn get_bit(&mut self) -> bool {
        self.get_bits(1) != 0
    }

    /// Discard `n` bits.
    pub fn skip(&mut self, mut n: u32) {
        while n > 0 {
            let step = n.min(16);
            self.get_bits(step);
            n -= step;
        }
    }

    /// Bits left before reads start zero-filling.
    pub fn bits_remaining(&self) -> usize {
        self.bits_in_buf as usize + (self.data.len() - self.pos) * 8
    }
}

/// MSB-first packing mirror of [`MsbBitReader`]. `finish` pads the final
/// partial byte with zero bits on the right.
pub struct MsbBitWriter {
    data: Vec<u8>,
    bit_buf: u32,
    bits_in_buf: u32,
}

impl MsbBitWriter {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            bit_buf: 0,
            bits_in_buf: 0,
        }
    }

    /// Append the low `n` bits of `value` (n <= 16), MSB first.
    pub fn put_bits(&mut self, value: u16, n: u32) {
        debug_assert!(n <= 16);
        if n == 0 {
            return;
        }
        self.bit_buf = (self.bit_buf << n) | u32::from(value & ((1u32 << n) - 1) as u16);
        self.bits_in_buf += n;
        while self.bits_in_buf >= 8 {
            self.data
                .push(((self.bit_buf >> (self.bits_in_buf - 8)) & 0xff) as u8);
            self.bits_in_buf -= 8;
        }
    }

    pub fn put_bit(&mut self, bit: bool) {
        self.put_bits(bit as u16, 1);
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.bits_in_buf > 0 {
            self.data
                .push(((self.bit_buf << (8 - self.bits_in_buf)) & 0xff) as u8);
        }
        self.data
    }
}

impl Default for MsbBitWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Least-significant-bit-first cursor for compressed code streams.
///
/// Unlike the MSB reader this one reports exhaustion: code streams end with
/// an explicit terminator, so running dry mid-read means the stream is
/// truncated and the caller must say so.
pub struct LsbBitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u64,
    bits_in_buf: u32,
}

impl<'a> LsbBitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buf: 0,
            bits_in_buf: 0,
        }
    }

    fn fill_buf(&mut self) {
        while self.bits_in_buf <= 56 && self.pos < self.data.len() {
            self.bit_buf |= u64::from(self.data[self.pos]) << self.bits_in_buf;
            self.pos += 1;
            self.bits_in_buf += 8;
        }
    }

    /// Read `n` bits (n <= 32), low bit first. `None` once fewer than `n`
    /// real bits remain; the leftover bits stay unconsumed.
    pub fn read_bits(&mut self, n: u32) -> Option<u32> {
        debug_assert!(n <= 32);
        if n == 0 {
            return Some(0);
        }
        self.fill_buf();
        if self.bits_in_buf < n {
            return None;
        }
        let value = (self.bit_buf & ((1u64 << n) - 1)) as u32;
        self.bit_buf >>= n;
        self.bits_in_buf -= n;
        Some(value)
    }
}

/// LSB-first packing mirror of [`LsbBitReader`].
pub struct LsbBitWriter {
    data: Vec<u8>,
    bit_buf: u64,
    bits_in_buf: u32,
}

impl LsbBitWriter {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            bit_buf: 0,
            bits_in_buf: 0,
        }
    }

    /// Append the low `n` bits of `value` (n <= 32), low bit first.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32);
        if n == 0 {
            return;
        }
        self.bit_buf |= u64::from(value & (((1u64 << n) - 1) as u32)) << self.bits_in_buf;
        self.bits_in_buf += n;
        while self.bits_in_buf >= 8 {
            self.data.push((self.bit_buf & 0xff) as u8);
            self.bit_buf >>= 8;
            self.bits_in_buf -= 8;
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        if self.bits_in_buf > 0 {
            self.data.push((self.bit_buf & 0xff) as u8);
        }
        self.data
    }
}

impl Default for LsbBitWriter {
    fn default() -> Self {
        Self::new()
    }
}
