//! Switch control frames exchanged with the switch pinger.
//!
//! These travel by label alone and never touch a session: the pinger
//! measures paths through the switch fabric, not peers.

use tracing::trace;

use super::{Delivery, DispatchError, Dispatcher};
use crate::wire::{
    is_switch_control, FormatError, Message, SwitchHeader, SwitchLabel, SWITCH_CONTROL_MARKER,
    SWITCH_HEADER_SIZE,
};

/// Build `SwitchHeader || marker || payload` for `label`.
pub(super) fn switch_control_frame(label: SwitchLabel, payload: &[u8]) -> Message {
    let mut msg = Message::new(payload);
    msg.push(&SWITCH_CONTROL_MARKER);
    msg.push(&SwitchHeader::new(label).encode());
    msg
}

impl Dispatcher {
    /// Forward a pinger frame to the switch unchanged.
    pub(super) fn handle_pinger_outbound(&mut self, msg: Message) -> Result<Delivery, DispatchError> {
        let header = SwitchHeader::parse(msg.bytes())?;
        if !is_switch_control(&msg.bytes()[SWITCH_HEADER_SIZE..]) {
            return Err(FormatError::NotSwitchControl.into());
        }

        trace!(label = %header.label, len = msg.len(), "Switch ping sent");
        self.switch.send(msg)?;
        Ok(Delivery::Switch)
    }

    /// Hand a switch control frame from the fabric to the pinger.
    pub(super) fn handle_switch_control(
        &mut self,
        header: SwitchHeader,
        mut msg: Message,
    ) -> Result<Delivery, DispatchError> {
        trace!(label = %header.label, len = msg.len(), "Switch control frame received");
        msg.push(&header.encode());
        self.pinger.send(msg)?;
        Ok(Delivery::SwitchPinger)
    }
}
