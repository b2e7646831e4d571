/*!
    Cancelling blocking demuxer calls from another thread.
*/

use std::ffi::{c_int, c_void};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg_next::{ffi, format::context::Input as InputContext};

/**
    A handle that aborts blocking reads of a decoder session.

    FFmpeg polls the flag from inside network reads; once set, the read
    returns immediately and the session reports an I/O failure. The flag
    is cleared each time the session is opened.
*/
#[derive(Clone, Debug, Default)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /**
        Point the input's interrupt callback at this handle's flag.

        The session keeps a clone of the handle for as long as the input
        context exists, so the pointer stays valid.
    */
    pub(crate) fn install(&self, input: &mut InputContext) {
        // SAFETY: the context pointer is valid for the lifetime of `input`
        // and the flag outlives it (see above).
        unsafe {
            let context = input.as_mut_ptr();
            (*context).interrupt_callback = ffi::AVIOInterruptCB {
                callback: Some(interrupt_callback),
                opaque: Arc::as_ptr(&self.flag) as *mut c_void,
            };
        }
    }
}

unsafe extern "C" fn interrupt_callback(opaque: *mut c_void) -> c_int {
    // SAFETY: `opaque` was set by `Interrupter::install` to a live AtomicBool.
    let flag = unsafe { &*(opaque as *const AtomicBool) };
    c_int::from(flag.load(Ordering::Relaxed))
}
