//! Direct2D drawing backend.
//!
//! Each target owns its own factories and an `ID2D1HwndRenderTarget`, so
//! every resource created from it dies with it. `Direct2D` itself holds
//! nothing and can move freely between threads.

use windows::core::{Interface, PCWSTR};
use windows::Win32::Graphics::Direct2D::Common::{
    D2D1_ALPHA_MODE_PREMULTIPLIED, D2D1_ALPHA_MODE_UNKNOWN, D2D1_COLOR_F,
    D2D1_FIGURE_BEGIN_FILLED, D2D1_FIGURE_BEGIN_HOLLOW, D2D1_FIGURE_END_CLOSED,
    D2D1_FIGURE_END_OPEN, D2D1_PIXEL_FORMAT, D2D_POINT_2F, D2D_RECT_F, D2D_SIZE_U,
};
use windows::Win32::Graphics::Direct2D::{
    D2D1CreateFactory, ID2D1Bitmap, ID2D1Factory, ID2D1Geometry, ID2D1HwndRenderTarget,
    ID2D1SolidColorBrush, D2D1_ANTIALIAS_MODE_ALIASED, D2D1_ANTIALIAS_MODE_PER_PRIMITIVE,
    D2D1_BITMAP_INTERPOLATION_MODE_LINEAR, D2D1_BITMAP_PROPERTIES, D2D1_BRUSH_PROPERTIES,
    D2D1_DRAW_TEXT_OPTIONS_NONE, D2D1_ELLIPSE, D2D1_FACTORY_TYPE_SINGLE_THREADED,
    D2D1_FEATURE_LEVEL_DEFAULT, D2D1_HWND_RENDER_TARGET_PROPERTIES, D2D1_PRESENT_OPTIONS_IMMEDIATELY,
    D2D1_PRESENT_OPTIONS_NONE, D2D1_RENDER_TARGET_PROPERTIES, D2D1_RENDER_TARGET_TYPE_DEFAULT,
    D2D1_RENDER_TARGET_USAGE_NONE, D2D1_ROUNDED_RECT, D2D1_TEXT_ANTIALIAS_MODE_ALIASED,
    D2D1_TEXT_ANTIALIAS_MODE_GRAYSCALE,
};
use windows::Win32::Graphics::DirectWrite::{
    DWriteCreateFactory, IDWriteFactory, IDWriteTextFormat, IDWriteTextLayout,
    DWRITE_FACTORY_TYPE_SHARED, DWRITE_FONT_STRETCH_NORMAL, DWRITE_FONT_STYLE_ITALIC,
    DWRITE_FONT_STYLE_NORMAL, DWRITE_FONT_WEIGHT_BOLD, DWRITE_FONT_WEIGHT_NORMAL,
    DWRITE_TEXT_METRICS,
};
use windows::Foundation::Numerics::Matrix3x2;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_UNKNOWN};

use crate::platform::{
    BackendError, BackendResult, FontDescriptor, GraphicsBackend, ImageData, PixelFormat,
    TargetParams,
};
use crate::types::{Color, PointF, RectF, Size, SizeF};

/// D2DERR_RECREATE_TARGET
const RECREATE_TARGET: u32 = 0x8899_000C;
/// DXGI_ERROR_DEVICE_REMOVED
const DEVICE_REMOVED: u32 = 0x887A_0005;
/// DXGI_ERROR_DEVICE_RESET
const DEVICE_RESET: u32 = 0x887A_0007;
/// WINCODEC_ERR_UNSUPPORTEDPIXELFORMAT, also returned by D2D
const UNSUPPORTED_PIXEL_FORMAT: u32 = 0x8898_2F80;

fn map_error(err: windows::core::Error) -> BackendError {
    match err.code().0 as u32 {
        RECREATE_TARGET | DEVICE_REMOVED | DEVICE_RESET => BackendError::DeviceLost,
        UNSUPPORTED_PIXEL_FORMAT => BackendError::UnsupportedFormat,
        _ => BackendError::failed(format!("{:?}", err)),
    }
}

fn color_f(c: Color) -> D2D1_COLOR_F {
    D2D1_COLOR_F {
        r: c.r,
        g: c.g,
        b: c.b,
        a: c.a,
    }
}

fn point(p: PointF) -> D2D_POINT_2F {
    D2D_POINT_2F { x: p.x, y: p.y }
}

fn rect_f(r: RectF) -> D2D_RECT_F {
    D2D_RECT_F {
        left: r.left,
        top: r.top,
        right: r.right,
        bottom: r.bottom,
    }
}

fn size_u(size: Size) -> D2D_SIZE_U {
    D2D_SIZE_U {
        width: size.width,
        height: size.height,
    }
}

/// A live HWND render target and the factories its resources come from.
pub struct D2DTarget {
    factory: ID2D1Factory,
    dwrite: IDWriteFactory,
    target: ID2D1HwndRenderTarget,
}

/// `GraphicsBackend` implemented with Direct2D and DirectWrite.
#[derive(Debug, Default, Clone, Copy)]
pub struct Direct2D;

impl Direct2D {
    pub fn new() -> Self {
        Self
    }
}

impl GraphicsBackend for Direct2D {
    type Target = D2DTarget;
    type Brush = ID2D1SolidColorBrush;
    type Font = IDWriteTextFormat;
    type TextLayout = IDWriteTextLayout;
    type Image = ID2D1Bitmap;
    type Geometry = ID2D1Geometry;

    fn create_target(&self, params: &TargetParams) -> BackendResult<D2DTarget> {
        let pixel_format = match params.format {
            PixelFormat::Bgra8Premultiplied => D2D1_PIXEL_FORMAT {
                format: DXGI_FORMAT_B8G8R8A8_UNORM,
                alphaMode: D2D1_ALPHA_MODE_PREMULTIPLIED,
            },
            PixelFormat::Unknown => D2D1_PIXEL_FORMAT {
                format: DXGI_FORMAT_UNKNOWN,
                alphaMode: D2D1_ALPHA_MODE_UNKNOWN,
            },
        };

        // Fixed 96 DPI keeps one DIP equal to one pixel.
        let props = D2D1_RENDER_TARGET_PROPERTIES {
            r#type: D2D1_RENDER_TARGET_TYPE_DEFAULT,
            pixelFormat: pixel_format,
            dpiX: 96.0,
            dpiY: 96.0,
            usage: D2D1_RENDER_TARGET_USAGE_NONE,
            minLevel: D2D1_FEATURE_LEVEL_DEFAULT,
        };

        let hwnd_props = D2D1_HWND_RENDER_TARGET_PROPERTIES {
            hwnd: HWND(params.handle.0 as *mut _),
            pixelSize: size_u(params.size),
            presentOptions: if params.vsync {
                D2D1_PRESENT_OPTIONS_NONE
            } else {
                D2D1_PRESENT_OPTIONS_IMMEDIATELY
            },
        };

        unsafe {
            let factory: ID2D1Factory =
                D2D1CreateFactory(D2D1_FACTORY_TYPE_SINGLE_THREADED, None).map_err(map_error)?;
            let dwrite: IDWriteFactory =
                DWriteCreateFactory(DWRITE_FACTORY_TYPE_SHARED).map_err(map_error)?;
            let target = factory
                .CreateHwndRenderTarget(&props, &hwnd_props)
                .map_err(map_error)?;

            target.SetAntialiasMode(if params.antialiasing {
                D2D1_ANTIALIAS_MODE_PER_PRIMITIVE
            } else {
                D2D1_ANTIALIAS_MODE_ALIASED
            });
            // ClearType needs an opaque background, so grayscale on a
            // transparent window.
            target.SetTextAntialiasMode(if params.text_antialiasing {
                D2D1_TEXT_ANTIALIAS_MODE_GRAYSCALE
            } else {
                D2D1_TEXT_ANTIALIAS_MODE_ALIASED
            });

            log::debug!(
                "[D2D] Created render target {}x{} ({:?})",
                params.size.width,
                params.size.height,
                params.format
            );

            Ok(D2DTarget {
                factory,
                dwrite,
                target,
            })
        }
    }

    fn resize_target(&self, target: &D2DTarget, size: Size) -> BackendResult<()> {
        unsafe { target.target.Resize(&size_u(size)).map_err(map_error) }
    }

    fn begin_draw(&self, target: &D2DTarget) {
        unsafe {
            target.target.BeginDraw();
            target.target.SetTransform(&Matrix3x2::identity());
        }
    }

    fn end_draw(&self, target: &D2DTarget) -> BackendResult<()> {
        unsafe { target.target.EndDraw(None, None).map_err(map_error) }
    }

    fn clear(&self, target: &D2DTarget, color: Color) {
        unsafe { target.target.Clear(Some(&color_f(color))) }
    }

    fn create_brush(&self, target: &D2DTarget, color: Color) -> BackendResult<ID2D1SolidColorBrush> {
        let props = D2D1_BRUSH_PROPERTIES {
            opacity: 1.0,
            transform: Matrix3x2::identity(),
        };
        unsafe {
            target
                .target
                .CreateSolidColorBrush(&color_f(color), Some(&props))
                .map_err(map_error)
        }
    }

    fn set_brush_color(&self, brush: &ID2D1SolidColorBrush, color: Color) {
        unsafe { brush.SetColor(&color_f(color)) }
    }

    fn create_font(
        &self,
        target: &D2DTarget,
        desc: &FontDescriptor,
    ) -> BackendResult<IDWriteTextFormat> {
        let family: Vec<u16> = desc.family.encode_utf16().chain(std::iter::once(0)).collect();
        let locale: Vec<u16> = "en-US\0".encode_utf16().collect();
        let weight = if desc.bold {
            DWRITE_FONT_WEIGHT_BOLD
        } else {
            DWRITE_FONT_WEIGHT_NORMAL
        };
        let style = if desc.italic {
            DWRITE_FONT_STYLE_ITALIC
        } else {
            DWRITE_FONT_STYLE_NORMAL
        };

        unsafe {
            target
                .dwrite
                .CreateTextFormat(
                    PCWSTR(family.as_ptr()),
                    None,
                    weight,
                    style,
                    DWRITE_FONT_STRETCH_NORMAL,
                    desc.size,
                    PCWSTR(locale.as_ptr()),
                )
                .map_err(map_error)
        }
    }

    fn create_text_layout(
        &self,
        target: &D2DTarget,
        font: &IDWriteTextFormat,
        text: &str,
    ) -> BackendResult<IDWriteTextLayout> {
        let wide: Vec<u16> = text.encode_utf16().collect();
        unsafe {
            target
                .dwrite
                .CreateTextLayout(&wide, font, f32::MAX, f32::MAX)
                .map_err(map_error)
        }
    }

    fn measure_layout(&self, layout: &IDWriteTextLayout) -> SizeF {
        let mut metrics = DWRITE_TEXT_METRICS::default();
        match unsafe { layout.GetMetrics(&mut metrics) } {
            Ok(()) => SizeF::new(metrics.widthIncludingTrailingWhitespace, metrics.height),
            Err(e) => {
                log::warn!("[D2D] GetMetrics failed: {:?}", e);
                SizeF::default()
            }
        }
    }

    fn create_image(&self, target: &D2DTarget, data: &ImageData) -> BackendResult<ID2D1Bitmap> {
        let pixels = data.to_premultiplied_bgra();
        let props = D2D1_BITMAP_PROPERTIES {
            pixelFormat: D2D1_PIXEL_FORMAT {
                format: DXGI_FORMAT_B8G8R8A8_UNORM,
                alphaMode: D2D1_ALPHA_MODE_PREMULTIPLIED,
            },
            dpiX: 96.0,
            dpiY: 96.0,
        };
        unsafe {
            target
                .target
                .CreateBitmap(
                    D2D_SIZE_U {
                        width: data.width,
                        height: data.height,
                    },
                    Some(pixels.as_ptr() as *const _),
                    data.width * 4,
                    &props,
                )
                .map_err(map_error)
        }
    }

    fn create_geometry(
        &self,
        target: &D2DTarget,
        points: &[PointF],
        closed: bool,
    ) -> BackendResult<ID2D1Geometry> {
        if points.len() < 2 {
            return Err(BackendError::failed("geometry needs at least two points"));
        }
        let points: Vec<D2D_POINT_2F> = points.iter().copied().map(point).collect();

        unsafe {
            let path = target.factory.CreatePathGeometry().map_err(map_error)?;
            let sink = path.Open().map_err(map_error)?;
            sink.BeginFigure(
                points[0],
                if closed {
                    D2D1_FIGURE_BEGIN_FILLED
                } else {
                    D2D1_FIGURE_BEGIN_HOLLOW
                },
            );
            sink.AddLines(&points[1..]);
            sink.EndFigure(if closed {
                D2D1_FIGURE_END_CLOSED
            } else {
                D2D1_FIGURE_END_OPEN
            });
            sink.Close().map_err(map_error)?;
            path.cast::<ID2D1Geometry>().map_err(map_error)
        }
    }

    fn draw_line(
        &self,
        target: &D2DTarget,
        from: PointF,
        to: PointF,
        brush: &ID2D1SolidColorBrush,
        stroke: f32,
    ) {
        unsafe {
            target
                .target
                .DrawLine(point(from), point(to), brush, stroke, None)
        }
    }

    fn draw_rectangle(
        &self,
        target: &D2DTarget,
        rect: RectF,
        brush: &ID2D1SolidColorBrush,
        stroke: f32,
    ) {
        unsafe { target.target.DrawRectangle(&rect_f(rect), brush, stroke, None) }
    }

    fn fill_rectangle(&self, target: &D2DTarget, rect: RectF, brush: &ID2D1SolidColorBrush) {
        unsafe { target.target.FillRectangle(&rect_f(rect), brush) }
    }

    fn draw_rounded_rectangle(
        &self,
        target: &D2DTarget,
        rect: RectF,
        radius: f32,
        brush: &ID2D1SolidColorBrush,
        stroke: f32,
    ) {
        let rounded = D2D1_ROUNDED_RECT {
            rect: rect_f(rect),
            radiusX: radius,
            radiusY: radius,
        };
        unsafe {
            target
                .target
                .DrawRoundedRectangle(&rounded, brush, stroke, None)
        }
    }

    fn fill_rounded_rectangle(
        &self,
        target: &D2DTarget,
        rect: RectF,
        radius: f32,
        brush: &ID2D1SolidColorBrush,
    ) {
        let rounded = D2D1_ROUNDED_RECT {
            rect: rect_f(rect),
            radiusX: radius,
            radiusY: radius,
        };
        unsafe { target.target.FillRoundedRectangle(&rounded, brush) }
    }

    fn draw_ellipse(
        &self,
        target: &D2DTarget,
        center: PointF,
        radius_x: f32,
        radius_y: f32,
        brush: &ID2D1SolidColorBrush,
        stroke: f32,
    ) {
        let ellipse = D2D1_ELLIPSE {
            point: point(center),
            radiusX: radius_x,
            radiusY: radius_y,
        };
        unsafe { target.target.DrawEllipse(&ellipse, brush, stroke, None) }
    }

    fn fill_ellipse(
        &self,
        target: &D2DTarget,
        center: PointF,
        radius_x: f32,
        radius_y: f32,
        brush: &ID2D1SolidColorBrush,
    ) {
        let ellipse = D2D1_ELLIPSE {
            point: point(center),
            radiusX: radius_x,
            radiusY: radius_y,
        };
        unsafe { target.target.FillEllipse(&ellipse, brush) }
    }

    fn draw_geometry(
        &self,
        target: &D2DTarget,
        geometry: &ID2D1Geometry,
        brush: &ID2D1SolidColorBrush,
        stroke: f32,
    ) {
        unsafe { target.target.DrawGeometry(geometry, brush, stroke, None) }
    }

    fn fill_geometry(
        &self,
        target: &D2DTarget,
        geometry: &ID2D1Geometry,
        brush: &ID2D1SolidColorBrush,
    ) {
        unsafe { target.target.FillGeometry(geometry, brush, None) }
    }

    fn draw_text_layout(
        &self,
        target: &D2DTarget,
        origin: PointF,
        layout: &IDWriteTextLayout,
        brush: &ID2D1SolidColorBrush,
    ) {
        unsafe {
            target.target.DrawTextLayout(
                point(origin),
                layout,
                brush,
                D2D1_DRAW_TEXT_OPTIONS_NONE,
            )
        }
    }

    fn draw_image(&self, target: &D2DTarget, image: &ID2D1Bitmap, dest: RectF, opacity: f32) {
        unsafe {
            target.target.DrawBitmap(
                image,
                Some(&rect_f(dest)),
                opacity,
                D2D1_BITMAP_INTERPOLATION_MODE_LINEAR,
                None,
            )
        }
    }
}
