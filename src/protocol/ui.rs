//! LCD/button/OTP collaborator: `user_denied`, `display_otp`,
//! `clear_otp`, `get_string`. The physical driver is external; `Protocol` is
//! generic over this trait so the dispatch loop runs unchanged against the
//! stdio-backed simulator or firmware.

pub trait UserInterface {
    /// Displays the button-confirmation prompt for `cmd` and blocks until
    /// the physical user responds. Returns `true` if the user denied the
    /// action, `false` if they approved it; denial produces
    /// `Failure(PermissionDeniedUser)`.
    fn user_denied(&mut self, cmd: &str) -> bool;

    fn display_otp(&mut self, cmd: &str, otp_text: &str);
    fn clear_otp(&mut self);

    /// Looks up a localised string by `(set, code)`.
    fn get_string(&self, set: u16, code: u16) -> String;

    /// Accumulates one parsed transaction output for on-screen display, so
    /// the LCD component can build up the list shown to the user before
    /// consent is requested.
    fn show_output(&mut self, amount_text: &str, address_text: &str);
}

/// A scripted `UserInterface` for tests: consumes one pre-recorded approval
/// decision per call, panicking if the script runs out (a test bug, not a
/// runtime condition).
pub struct ScriptedUi {
    approvals: std::collections::VecDeque<bool>,
    otp_shown: Option<String>,
    outputs_shown: Vec<(String, String)>,
}

impl ScriptedUi {
    /// `approvals[i]` is `true` if the i-th `user_denied` call should report
    /// denial.
    pub fn new(denials: Vec<bool>) -> Self {
        ScriptedUi {
            approvals: denials.into(),
            otp_shown: None,
            outputs_shown: Vec::new(),
        }
    }

    pub fn shown_otp(&self) -> Option<&str> {
        self.otp_shown.as_deref()
    }

    pub fn outputs_shown(&self) -> &[(String, String)] {
        &self.outputs_shown
    }
}

impl UserInterface for ScriptedUi {
    fn user_denied(&mut self, _cmd: &str) -> bool {
        self.approvals.pop_front().unwrap_or(true)
    }

    fn display_otp(&mut self, _cmd: &str, otp_text: &str) {
        self.otp_shown = Some(otp_text.to_string());
    }

    fn clear_otp(&mut self) {
        self.otp_shown = None;
    }

    fn get_string(&self, _set: u16, _code: u16) -> String {
        String::new()
    }

    fn show_output(&mut self, amount_text: &str, address_text: &str) {
        self.outputs_shown.push((amount_text.to_string(), address_text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_ui_replays_in_order() {
        let mut ui = ScriptedUi::new(vec![false, true]);
        assert!(!ui.user_denied("create"));
        assert!(ui.user_denied("delete"));
    }

    #[test]
    fn otp_display_and_clear() {
        let mut ui = ScriptedUi::new(vec![]);
        ui.display_otp("delete", "123456");
        assert_eq!(ui.shown_otp(), Some("123456"));
        ui.clear_otp();
        assert_eq!(ui.shown_otp(), None);
    }
}
