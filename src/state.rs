use crate::styling::Stylist;

/// Shared, immutable per-process state handed to every handler.
pub struct AppState {
    pub stylist: Stylist,
}

impl AppState {
    pub fn new(stylist: Stylist) -> Self {
        AppState { stylist }
    }
}
