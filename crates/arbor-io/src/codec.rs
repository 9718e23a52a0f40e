//! Byte-order aware encoding of fixed-width scalars.

/// Byte order used to encode multi-byte scalars.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Most significant byte first (network order).
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

impl ByteOrder {
    /// Native byte order of the running host.
    pub const fn host() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// True if values in this order must be swapped to match the host.
    pub const fn needs_swap(self) -> bool {
        !matches!(
            (self, Self::host()),
            (ByteOrder::Big, ByteOrder::Big) | (ByteOrder::Little, ByteOrder::Little)
        )
    }
}

/// Type tags written ahead of values when a source is in debug mode.
pub mod type_code {
    pub const U8: u32 = 0x4152_0001;
    pub const I8: u32 = 0x4152_0002;
    pub const U16: u32 = 0x4152_0003;
    pub const I16: u32 = 0x4152_0004;
    pub const U32: u32 = 0x4152_0005;
    pub const I32: u32 = 0x4152_0006;
    pub const U64: u32 = 0x4152_0007;
    pub const I64: u32 = 0x4152_0008;
    pub const F32: u32 = 0x4152_0009;
    pub const F64: u32 = 0x4152_000a;
    pub const STRING: u32 = 0x4152_000b;
}

/// A fixed-width value that can be encoded in either byte order.
pub trait Scalar: Copy + Sized {
    /// Encoded width in bytes.
    const SIZE: usize;
    /// Tag used in debug mode.
    const TYPE_CODE: u32;

    /// Encode into `out`, which must be exactly `SIZE` bytes.
    fn encode(self, order: ByteOrder, out: &mut [u8]);

    /// Decode from `bytes`, which must be exactly `SIZE` bytes.
    fn decode(order: ByteOrder, bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty => $code:expr),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();
                const TYPE_CODE: u32 = $code;

                fn encode(self, order: ByteOrder, out: &mut [u8]) {
                    let bytes = match order {
                        ByteOrder::Big => self.to_be_bytes(),
                        ByteOrder::Little => self.to_le_bytes(),
                    };
                    out.copy_from_slice(&bytes);
                }

                fn decode(order: ByteOrder, bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    match order {
                        ByteOrder::Big => <$ty>::from_be_bytes(raw),
                        ByteOrder::Little => <$ty>::from_le_bytes(raw),
                    }
                }
            }
        )*
    };
}

impl_scalar! {
    u8 => type_code::U8,
    i8 => type_code::I8,
    u16 => type_code::U16,
    i16 => type_code::I16,
    u32 => type_code::U32,
    i32 => type_code::I32,
    u64 => type_code::U64,
    i64 => type_code::I64,
    f32 => type_code::F32,
    f64 => type_code::F64,
}
