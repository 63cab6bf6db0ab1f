//! System tray application and global hotkeys.
//!
//! A hidden message window receives WM_HOTKEY events and drives the engine
//! and the recorder. The designate/cancel hotkeys exist only while a
//! recording session is active so they do not shadow normal use of those
//! keys.

use anyhow::{anyhow, Result};

use windows::core::w;
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, POINT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT, VK_ESCAPE, VK_F8,
};
use windows::Win32::UI::Shell::{
    Shell_NotifyIconW, NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NOTIFYICONDATAW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreatePopupMenu, CreateWindowExW, DefWindowProcW, DestroyMenu, DestroyWindow, DispatchMessageW,
    GetCursorPos, GetMessageW, InsertMenuW, LoadIconW, PostQuitMessage, RegisterClassW,
    SetForegroundWindow, TrackPopupMenu, TranslateMessage, CS_HREDRAW, CS_VREDRAW, CW_USEDEFAULT,
    IDI_APPLICATION, MF_BYPOSITION, MF_SEPARATOR, MF_STRING, MSG, TPM_BOTTOMALIGN, TPM_LEFTALIGN,
    TPM_RIGHTBUTTON, WM_COMMAND, WM_DESTROY, WM_HOTKEY, WM_RBUTTONUP, WM_USER, WNDCLASSW,
    WS_OVERLAPPEDWINDOW,
};

use scenario_clicker::log;
use scenario_clicker::scenario::model::Point as ScreenPoint;
use scenario_clicker::scenario::ScenarioStore;

const HOTKEY_RECORD: i32 = 1;
const HOTKEY_RUN: i32 = 2;
const HOTKEY_STANDALONE: i32 = 3;
const HOTKEY_STOP: i32 = 4;
// Registered only while a recording session is active.
const HOTKEY_DESIGNATE: i32 = 10;
const HOTKEY_CANCEL: i32 = 11;

const WM_TRAYICON: u32 = WM_USER + 1;

// Menu item IDs
const MENU_RUN: usize = 1001;
const MENU_STANDALONE: usize = 1002;
const MENU_STOP: usize = 1003;
const MENU_LIST: usize = 1004;
const MENU_EXIT: usize = 1005;

/// Runs the tray application until the user exits.
pub fn run() -> Result<()> {
    let hwnd = create_message_window()?;
    add_tray_icon(hwnd)?;

    unsafe {
        RegisterHotKey(
            hwnd,
            HOTKEY_RECORD,
            MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT,
            0x52, // 'R' key
        )?;
        RegisterHotKey(
            hwnd,
            HOTKEY_RUN,
            MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT,
            0x53, // 'S' key
        )?;
        RegisterHotKey(
            hwnd,
            HOTKEY_STANDALONE,
            MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT,
            0x44, // 'D' key
        )?;
        RegisterHotKey(
            hwnd,
            HOTKEY_STOP,
            MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT,
            0x51, // 'Q' key
        )?;
    }

    log("Scenario Clicker started");
    log("Hotkey: Ctrl+Shift+R (record an action)");
    log("Hotkey: Ctrl+Shift+S (run active scenario)");
    log("Hotkey: Ctrl+Shift+D (toggle standalone detection)");
    log("Hotkey: Ctrl+Shift+Q (stop the active run)");
    log("While recording: F8 designates a point, Escape cancels");
    log("Right-click tray icon for the menu");

    let mut msg = MSG::default();
    unsafe {
        while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        let _ = UnregisterHotKey(hwnd, HOTKEY_RECORD);
        let _ = UnregisterHotKey(hwnd, HOTKEY_RUN);
        let _ = UnregisterHotKey(hwnd, HOTKEY_STANDALONE);
        let _ = UnregisterHotKey(hwnd, HOTKEY_STOP);
        unregister_recording_hotkeys(hwnd);
        remove_tray_icon(hwnd);
        let _ = DestroyWindow(hwnd);
    }

    Ok(())
}

fn active_scenario() -> Option<String> {
    scenario_clicker::config::get_config().active_scenario.clone()
}

fn register_recording_hotkeys(hwnd: HWND) {
    unsafe {
        if RegisterHotKey(hwnd, HOTKEY_DESIGNATE, MOD_NOREPEAT, VK_F8.0 as u32).is_err() {
            log("Could not register the F8 designate hotkey");
        }
        if RegisterHotKey(hwnd, HOTKEY_CANCEL, MOD_NOREPEAT, VK_ESCAPE.0 as u32).is_err() {
            log("Could not register the Escape cancel hotkey");
        }
    }
}

fn unregister_recording_hotkeys(hwnd: HWND) {
    unsafe {
        let _ = UnregisterHotKey(hwnd, HOTKEY_DESIGNATE);
        let _ = UnregisterHotKey(hwnd, HOTKEY_CANCEL);
    }
}

fn handle_record_hotkey(hwnd: HWND) {
    if scenario_clicker::recorder::is_recording() {
        log("Recording already in progress");
        return;
    }
    let name = active_scenario();
    match scenario_clicker::recorder::start_recording(name.as_deref()) {
        Ok(()) => register_recording_hotkeys(hwnd),
        Err(e) => log(&format!("Could not start recording: {}", e)),
    }
}

fn handle_designate_hotkey(hwnd: HWND) {
    let (x, y) = scenario_clicker::input::cursor_position();
    if let Err(e) = scenario_clicker::recorder::designate(ScreenPoint::new(x, y)) {
        log(&format!("Recording failed: {}", e));
    }
    if !scenario_clicker::recorder::is_recording() {
        unregister_recording_hotkeys(hwnd);
    }
}

fn handle_run_hotkey() {
    match active_scenario() {
        Some(name) => {
            if let Err(e) = scenario_clicker::engine::runner::start_scenario(&name) {
                log(&format!("Could not start scenario: {}", e));
            }
        }
        None => log("No active_scenario configured in config.json"),
    }
}

fn handle_standalone_hotkey() {
    match active_scenario() {
        Some(name) => {
            if let Err(e) = scenario_clicker::engine::runner::toggle_standalone(&name) {
                log(&format!("Could not toggle standalone detection: {}", e));
            }
        }
        None => log("No active_scenario configured in config.json"),
    }
}

fn list_scenarios() {
    match ScenarioStore::open(scenario_clicker::paths::get_scenarios_dir()) {
        Ok(store) => match store.list() {
            Ok(names) if names.is_empty() => log("No scenarios recorded yet"),
            Ok(names) => {
                for name in names {
                    log(&format!("Scenario: {}", name));
                }
            }
            Err(e) => log(&format!("Could not list scenarios: {}", e)),
        },
        Err(e) => log(&format!("Could not open scenario store: {}", e)),
    }
}

fn create_message_window() -> Result<HWND> {
    unsafe {
        let hinstance = GetModuleHandleW(None)?;
        let class_name = w!("ScenarioClickerClass");

        let wc = WNDCLASSW {
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(window_proc),
            hInstance: hinstance.into(),
            lpszClassName: class_name,
            ..Default::default()
        };

        let atom = RegisterClassW(&wc);
        if atom == 0 {
            return Err(anyhow!("Failed to register window class"));
        }

        let hwnd = CreateWindowExW(
            Default::default(),
            class_name,
            w!("Scenario Clicker"),
            WS_OVERLAPPEDWINDOW,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            None,
            None,
            hinstance,
            None,
        )?;

        Ok(hwnd)
    }
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    unsafe {
        match msg {
            WM_HOTKEY => {
                match wparam.0 as i32 {
                    HOTKEY_RECORD => handle_record_hotkey(hwnd),
                    HOTKEY_DESIGNATE => handle_designate_hotkey(hwnd),
                    HOTKEY_CANCEL => {
                        scenario_clicker::recorder::cancel();
                        unregister_recording_hotkeys(hwnd);
                    }
                    HOTKEY_RUN => handle_run_hotkey(),
                    HOTKEY_STANDALONE => handle_standalone_hotkey(),
                    HOTKEY_STOP => {
                        log("Stop requested");
                        scenario_clicker::engine::stop_active();
                    }
                    _ => {}
                }
                LRESULT(0)
            }
            WM_TRAYICON => {
                let event = (lparam.0 & 0xFFFF) as u32;
                if event == WM_RBUTTONUP {
                    show_context_menu(hwnd);
                }
                LRESULT(0)
            }
            WM_COMMAND => {
                match wparam.0 & 0xFFFF {
                    MENU_RUN => handle_run_hotkey(),
                    MENU_STANDALONE => handle_standalone_hotkey(),
                    MENU_STOP => scenario_clicker::engine::stop_active(),
                    MENU_LIST => list_scenarios(),
                    MENU_EXIT => {
                        log("Exit requested");
                        scenario_clicker::engine::stop_active();
                        scenario_clicker::recorder::cancel();
                        PostQuitMessage(0);
                    }
                    _ => {}
                }
                LRESULT(0)
            }
            WM_DESTROY => {
                PostQuitMessage(0);
                LRESULT(0)
            }
            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        }
    }
}

fn add_tray_icon(hwnd: HWND) -> Result<()> {
    unsafe {
        let mut nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: hwnd,
            uID: 1,
            uFlags: NIF_ICON | NIF_MESSAGE | NIF_TIP,
            uCallbackMessage: WM_TRAYICON,
            hIcon: LoadIconW(None, IDI_APPLICATION)?,
            ..Default::default()
        };

        let tip = "Scenario Clicker (Ctrl+Shift+R to record)";
        let tip_wide: Vec<u16> = tip.encode_utf16().chain(std::iter::once(0)).collect();
        let len = tip_wide.len().min(nid.szTip.len());
        nid.szTip[..len].copy_from_slice(&tip_wide[..len]);

        if !Shell_NotifyIconW(NIM_ADD, &nid).as_bool() {
            return Err(anyhow!("Failed to add tray icon"));
        }

        Ok(())
    }
}

fn remove_tray_icon(hwnd: HWND) {
    unsafe {
        let nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: hwnd,
            uID: 1,
            ..Default::default()
        };
        let _ = Shell_NotifyIconW(NIM_DELETE, &nid);
    }
}

fn show_context_menu(hwnd: HWND) {
    unsafe {
        let Ok(menu) = CreatePopupMenu() else {
            return;
        };

        // Inserted in reverse order since everything lands at position 0.
        let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_STRING, MENU_EXIT, w!("Exit"));
        let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_SEPARATOR, 0, None);
        let _ = InsertMenuW(
            menu,
            0,
            MF_BYPOSITION | MF_STRING,
            MENU_LIST,
            w!("List Scenarios"),
        );
        let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_STRING, MENU_STOP, w!("Stop"));
        let _ = InsertMenuW(
            menu,
            0,
            MF_BYPOSITION | MF_STRING,
            MENU_STANDALONE,
            w!("Toggle Standalone Detection"),
        );
        let _ = InsertMenuW(
            menu,
            0,
            MF_BYPOSITION | MF_STRING,
            MENU_RUN,
            w!("Run Scenario"),
        );

        let mut pt = POINT::default();
        let _ = GetCursorPos(&mut pt);

        // Required for the menu to dismiss properly.
        let _ = SetForegroundWindow(hwnd);

        let _ = TrackPopupMenu(
            menu,
            TPM_BOTTOMALIGN | TPM_LEFTALIGN | TPM_RIGHTBUTTON,
            pt.x,
            pt.y,
            0,
            hwnd,
            None,
        );

        let _ = DestroyMenu(menu);
    }
}
