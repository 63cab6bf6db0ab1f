//! GDI-based screen region capture.
//!
//! Blits the requested region of the primary screen into a memory DC and
//! reads it back with GetDIBits as top-down 32-bit BGRA, converted to RGBA
//! for the rest of the pipeline.

use image::{Rgba, RgbaImage};

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use super::{CaptureError, ScreenCapture};
use crate::scenario::model::Region;

/// Captures from the primary screen via GDI.
pub struct GdiCapture;

impl ScreenCapture for GdiCapture {
    fn capture(&self, region: Region) -> Result<RgbaImage, CaptureError> {
        let (screen_w, screen_h) = self.screen_size();
        if region.x1 < 0
            || region.y1 < 0
            || region.x2 > screen_w
            || region.y2 > screen_h
            || region.width() == 0
            || region.height() == 0
        {
            return Err(CaptureError::RegionOffScreen(region));
        }

        let width = region.width() as i32;
        let height = region.height() as i32;

        unsafe {
            let screen_dc = GetDC(HWND::default());
            if screen_dc.is_invalid() {
                return Err(CaptureError::Platform("GetDC failed".to_string()));
            }
            let mem_dc = CreateCompatibleDC(screen_dc);
            let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
            let old_bitmap = SelectObject(mem_dc, bitmap);

            let blit = BitBlt(
                mem_dc,
                0,
                0,
                width,
                height,
                screen_dc,
                region.x1,
                region.y1,
                SRCCOPY,
            );
            let result = match blit {
                Ok(()) => read_bitmap_pixels(mem_dc, bitmap, width, height),
                Err(e) => Err(CaptureError::Platform(format!("BitBlt failed: {}", e))),
            };

            SelectObject(mem_dc, old_bitmap);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(HWND::default(), screen_dc);

            result
        }
    }

    fn screen_size(&self) -> (i32, i32) {
        unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) }
    }
}

/// Reads the bitmap out of the memory DC and converts BGRA to RGBA.
unsafe fn read_bitmap_pixels(
    mem_dc: windows::Win32::Graphics::Gdi::HDC,
    bitmap: windows::Win32::Graphics::Gdi::HBITMAP,
    width: i32,
    height: i32,
) -> Result<RgbaImage, CaptureError> {
    let mut info = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            // Negative height requests top-down row order.
            biHeight: -height,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut pixels = vec![0u8; (width * height * 4) as usize];
    let lines = unsafe {
        GetDIBits(
            mem_dc,
            bitmap,
            0,
            height as u32,
            Some(pixels.as_mut_ptr() as *mut std::ffi::c_void),
            &mut info,
            DIB_RGB_COLORS,
        )
    };
    if lines == 0 {
        return Err(CaptureError::Platform("GetDIBits failed".to_string()));
    }

    let mut img = RgbaImage::new(width as u32, height as u32);
    for (i, px) in img.pixels_mut().enumerate() {
        let o = i * 4;
        *px = Rgba([pixels[o + 2], pixels[o + 1], pixels[o], 255]);
    }
    Ok(img)
}
