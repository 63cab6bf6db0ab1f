//! Mouse input injection.
//!
//! Clicks are fire-and-forget: the automation is best-effort and a click
//! that lands nowhere is indistinguishable from one that worked, so the
//! trait reports nothing back.

/// Pointer-injection primitive.
pub trait Pointer {
    /// Moves the cursor to absolute screen coordinates.
    fn move_to(&self, x: i32, y: i32);

    /// Left-clicks at the current cursor position.
    fn click(&self);

    /// Current cursor position in screen coordinates.
    fn position(&self) -> (i32, i32);
}

#[cfg(target_os = "windows")]
mod send_input {
    use std::time::Duration;

    use windows::Win32::Foundation::POINT;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN,
        MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MOVE, MOUSEINPUT, MOUSE_EVENT_FLAGS,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetCursorPos, GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN,
    };

    use super::Pointer;

    /// Hardware-level pointer injection via SendInput.
    ///
    /// SendInput moves the real cursor; the engine serializes runs so two
    /// injection sources never interleave.
    pub struct SendInputPointer;

    impl SendInputPointer {
        fn send(dx: i32, dy: i32, flags: MOUSE_EVENT_FLAGS) {
            let input = INPUT {
                r#type: INPUT_MOUSE,
                Anonymous: INPUT_0 {
                    mi: MOUSEINPUT {
                        dx,
                        dy,
                        dwFlags: flags,
                        ..Default::default()
                    },
                },
            };
            unsafe {
                SendInput(&[input], std::mem::size_of::<INPUT>() as i32);
            }
        }
    }

    impl Pointer for SendInputPointer {
        fn move_to(&self, x: i32, y: i32) {
            let (screen_w, screen_h) =
                unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
            if screen_w <= 0 || screen_h <= 0 {
                return;
            }
            // MOUSEEVENTF_ABSOLUTE expects coordinates normalized to 0-65535.
            let norm_x = ((x as i64 * 65535) / screen_w as i64) as i32;
            let norm_y = ((y as i64 * 65535) / screen_h as i64) as i32;
            Self::send(norm_x, norm_y, MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE);
        }

        fn click(&self) {
            Self::send(0, 0, MOUSEEVENTF_LEFTDOWN);
            std::thread::sleep(Duration::from_millis(50));
            Self::send(0, 0, MOUSEEVENTF_LEFTUP);
        }

        fn position(&self) -> (i32, i32) {
            let mut pt = POINT::default();
            unsafe {
                let _ = GetCursorPos(&mut pt);
            }
            (pt.x, pt.y)
        }
    }

    /// Current cursor position, for the hotkey layer outside any session.
    pub fn cursor_position() -> (i32, i32) {
        SendInputPointer.position()
    }
}

#[cfg(target_os = "windows")]
pub use send_input::{cursor_position, SendInputPointer};
