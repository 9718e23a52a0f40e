bitflags::bitflags! {
    /// Per-object state and persistence flags.
    ///
    /// Only the bits in [`ObjectFlags::SAVED`] are written to an archive;
    /// on load they replace the same bits in memory and leave the rest
    /// untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u32 {
        /// Storage outlives `destroy`; the handle stays usable afterwards.
        const STATIC = 1 << 0;
        /// Never archived, and never restored as a child.
        const NON_PERSISTENT = 1 << 1;
        /// Dataset is currently loaded.
        const RESIDENT = 1 << 2;
        /// Generate a unique name when attached.
        const NAME_ON_ATTACH = 1 << 3;
        /// Archive lists persistent children.
        const CHLD_AUTOSAVE = 1 << 4;
        /// Never paged out.
        const REMAIN_DATA = 1 << 5;
        /// Dataset carries per-scalar type tags.
        const DEBUG_DATA = 1 << 6;
        const READONLY = 1 << 7;

        const SAVED = Self::NAME_ON_ATTACH.bits()
            | Self::CHLD_AUTOSAVE.bits()
            | Self::REMAIN_DATA.bits()
            | Self::DEBUG_DATA.bits()
            | Self::READONLY.bits();
    }
}

impl ObjectFlags {
    /// Replace the saved subset of `self` with the saved subset of `disk`.
    pub fn merge_saved(self, disk: ObjectFlags) -> ObjectFlags {
        (self - ObjectFlags::SAVED) | (disk & ObjectFlags::SAVED)
    }
}
