//! Lens blur C FFI entry points.
//!
//! Compiled as a cdylib and loaded by the host application. All public
//! functions use the `extern "C"` ABI with `#[no_mangle]`. Sessions are
//! identified by `u64` handles; 0 means failure.

mod handle;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::{Arc, LazyLock, Mutex};

use handle::{lock, with_entry, HandleStore};
use lensblur_render::{Frame, LensBlurContext, LensBlurError, SessionConfig};

pub const LB_OK: i32 = 0;
pub const LB_ERR_INVALID_SESSION: i32 = -1;
pub const LB_ERR_INVALID_ARGUMENT: i32 = -2;
pub const LB_ERR_NO_PLATFORM: i32 = -3;
pub const LB_ERR_FILE_NOT_FOUND: i32 = -4;
pub const LB_ERR_DEVICE: i32 = -5;
pub const LB_ERR_BUFFER_SIZE: i32 = -6;
pub const LB_ERR_ABI_MISMATCH: i32 = -7;

struct SessionEntry {
    context: LensBlurContext,
    last_error: Option<CString>,
}

/// Each session has its own lock; the store lock only guards handle lookup.
static SESSIONS: LazyLock<Mutex<HandleStore<Arc<Mutex<SessionEntry>>>>> =
    LazyLock::new(|| Mutex::new(HandleStore::new()));

fn status_code(err: &LensBlurError) -> i32 {
    match err {
        LensBlurError::NoPlatform => LB_ERR_NO_PLATFORM,
        LensBlurError::FileNotFound { .. } => LB_ERR_FILE_NOT_FOUND,
        LensBlurError::Device(_) => LB_ERR_DEVICE,
        LensBlurError::BufferSize { .. } => LB_ERR_BUFFER_SIZE,
        LensBlurError::InvalidDimensions { .. } => LB_ERR_INVALID_ARGUMENT,
        LensBlurError::AbiMismatch { .. } => LB_ERR_ABI_MISMATCH,
    }
}

fn to_c_string(message: &str) -> CString {
    CString::new(message.replace('\0', " ")).unwrap_or_default()
}

/// A failed call: status code plus message for `lb_last_error`.
struct CallError {
    code: i32,
    message: String,
}

impl From<LensBlurError> for CallError {
    fn from(err: LensBlurError) -> Self {
        Self { code: status_code(&err), message: err.to_string() }
    }
}

fn invalid_argument(message: impl Into<String>) -> CallError {
    CallError { code: LB_ERR_INVALID_ARGUMENT, message: message.into() }
}

/// Borrowed view of the caller's arrays.
struct RawFrame<'a> {
    frame: Frame<'a>,
    output: &'a mut [u32],
}

/// Check pointers and dimensions, then borrow `width * height` elements of each array.
///
/// # Safety
/// Every non-null pointer must be valid for `width * height` elements and
/// stay valid and unaliased by other Rust references for `'a`.
unsafe fn raw_frame<'a>(
    image: *const u32,
    depth: *const u32,
    blur: *mut u32,
    coc: *const f32,
    width: i32,
    height: i32,
    z_focus: i32,
) -> Result<RawFrame<'a>, CallError> {
    if width < 0 || height < 0 {
        return Err(LensBlurError::InvalidDimensions { width: width as i64, height: height as i64 }.into());
    }
    let (width, height) = (width as u32, height as u32);
    let n = (width as usize)
        .checked_mul(height as usize)
        .ok_or(LensBlurError::InvalidDimensions { width: width as i64, height: height as i64 })?;

    if n == 0 {
        return Ok(RawFrame {
            frame: Frame { color: &[], depth: &[], coc: &[], width, height, z_focus },
            output: &mut [],
        });
    }

    for (name, is_null) in [
        ("image", image.is_null()),
        ("depth", depth.is_null()),
        ("blur", blur.is_null()),
        ("coc", coc.is_null()),
    ] {
        if is_null {
            return Err(invalid_argument(format!("{name} pointer is null")));
        }
    }
    if std::ptr::eq(image, blur) || std::ptr::eq(depth, blur) {
        return Err(invalid_argument("blur output aliases an input array"));
    }

    let frame = Frame {
        color: std::slice::from_raw_parts(image, n),
        depth: std::slice::from_raw_parts(depth, n),
        coc: std::slice::from_raw_parts(coc, n),
        width,
        height,
        z_focus,
    };
    Ok(RawFrame { frame, output: std::slice::from_raw_parts_mut(blur, n) })
}

// ============================================================
// FFI: Session lifecycle
// ============================================================

/// Create a lens blur session: select an adapter, load and compile the kernels.
///
/// `kernel_dir` may be null to use `LENSBLUR_KERNEL_DIR` or the embedded
/// kernels. Returns a session handle (> 0) on success, 0 on failure.
///
/// # Safety
/// `kernel_dir` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn lb_initialize(kernel_dir: *const c_char) -> u64 {
    let _ = env_logger::try_init();

    let mut config = SessionConfig::from_env();
    if !kernel_dir.is_null() {
        let dir = CStr::from_ptr(kernel_dir).to_string_lossy().into_owned();
        config = config.with_kernel_dir(dir);
    }

    match LensBlurContext::new(&config) {
        Ok(context) => {
            log::info!("Lens blur session ready: {}", context.session);
            let entry = SessionEntry { context, last_error: None };
            lock(&SESSIONS).insert(Arc::new(Mutex::new(entry)))
        }
        Err(e) => {
            log::error!("Lens blur initialization failed: {e}");
            0
        }
    }
}

/// Release a session and every device resource it owns.
#[no_mangle]
pub extern "C" fn lb_shutdown(session: u64) {
    let removed = lock(&SESSIONS).remove(session);
    if let Some(entry) = removed {
        // Device objects are released once an in-flight call on this session returns.
        drop(entry);
        log::info!("Lens blur session {session} shut down");
    }
}

/// Last error message for `session`, or null. Valid until the next call on
/// the same session or its shutdown.
#[no_mangle]
pub extern "C" fn lb_last_error(session: u64) -> *const c_char {
    with_entry(&SESSIONS, session, |entry| {
        entry.last_error.as_ref().map_or(std::ptr::null(), |msg| msg.as_ptr())
    })
    .unwrap_or(std::ptr::null())
}

// ============================================================
// FFI: Effect
// ============================================================

/// Blur `image` by `depth` around `z_focus` and write the result to `blur`.
///
/// `tmp_int` and `tmp_float` are accepted for layout compatibility and not
/// used. Returns `LB_OK` or a negative `LB_ERR_*` status.
///
/// # Safety
/// `image`, `depth`, `blur` and `coc` must each point to `width * height`
/// elements; `blur` must not overlap the others.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn lb_lens_blur(
    session: u64,
    image: *mut u32,
    depth: *mut u32,
    blur: *mut u32,
    coc: *mut f32,
    _tmp_int: *mut u32,
    _tmp_float: *mut f32,
    width: i32,
    height: i32,
    z_focus: i32,
) -> i32 {
    with_entry(&SESSIONS, session, |entry| {
        let result = raw_frame(image, depth, blur, coc, width, height, z_focus)
            .and_then(|raw| entry.context.apply(&raw.frame, raw.output).map_err(CallError::from));

        match result {
            Ok(()) => {
                entry.last_error = None;
                LB_OK
            }
            Err(e) => {
                log::error!("Lens blur failed ({}): {}", e.code, e.message);
                entry.last_error = Some(to_c_string(&e.message));
                e.code
            }
        }
    })
    .unwrap_or(LB_ERR_INVALID_SESSION)
}

/// One-shot variant: opens a session, blurs once, tears everything down.
///
/// Nothing is written to `blur` when no adapter is available or any step
/// fails; failures are only logged.
///
/// # Safety
/// Same contract as [`lb_lens_blur`].
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn lb_lens_blur_once(
    image: *mut u32,
    depth: *mut u32,
    blur: *mut u32,
    coc: *mut f32,
    _tmp_int: *mut u32,
    _tmp_float: *mut f32,
    width: i32,
    height: i32,
    z_focus: i32,
) {
    let _ = env_logger::try_init();

    let raw = match raw_frame(image, depth, blur, coc, width, height, z_focus) {
        Ok(raw) => raw,
        Err(e) => {
            log::error!("Lens blur skipped: {}", e.message);
            return;
        }
    };

    match blur_once(&SessionConfig::from_env(), raw) {
        Ok(()) => {}
        Err(LensBlurError::NoPlatform) => log::info!("Lens blur skipped: no compute adapter"),
        Err(e) => log::error!("Lens blur failed: {e}"),
    }
}

/// Build a context for `config`, apply it once and drop it.
fn blur_once(config: &SessionConfig, raw: RawFrame<'_>) -> Result<(), LensBlurError> {
    if raw.output.is_empty() {
        return Ok(());
    }
    LensBlurContext::new(config)?.apply(&raw.frame, raw.output)
}
