use bitflags::bitflags;

bitflags! {
    /// Feature bitmask an execution venue advertises, so a strategy or
    /// risk layer can check support before submitting an order shape the
    /// venue can't honor.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub struct ExecutionCapabilities: u32 {
        const LIMIT               = 1 << 0;
        const MARKET              = 1 << 1;
        const STOP_MARKET         = 1 << 2;
        const STOP_LIMIT          = 1 << 3;
        const TAKE_PROFIT_MARKET  = 1 << 4;
        const TAKE_PROFIT_LIMIT   = 1 << 5;
        const TRAILING_STOP       = 1 << 6;
        const ICEBERG             = 1 << 7;
        const TIME_IN_FORCE_GTC   = 1 << 8;
        const TIME_IN_FORCE_IOC   = 1 << 9;
        const TIME_IN_FORCE_FOK   = 1 << 10;
        const TIME_IN_FORCE_DAY   = 1 << 11;
        const REDUCE_ONLY         = 1 << 12;
        const CLOSE_POSITION      = 1 << 13;
        const OCO                 = 1 << 14;
    }
}

impl ExecutionCapabilities {
    /// Every order kind, every TIF policy, `reduceOnly`, `closePosition`,
    /// and OCO — per §4.7, what the simulated executor advertises.
    #[must_use]
    pub const fn simulated() -> Self {
        Self::all()
    }
}
