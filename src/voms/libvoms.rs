//! Native binding to the VOMS C API (`libvomsapi`).
//!
//! This is the production implementation of the validation boundary. The
//! library is dlopen'd at startup, so the server binary itself carries no
//! link-time dependency on the grid middleware. The `#[repr(C)]` structs
//! below mirror `voms.h`; they are boundary declarations only — nothing
//! outside this module touches raw native data.
//!
//! # Session discipline
//!
//! Every `validate` call opens its own `VOMS_Init` session and releases it
//! through [`Session`]'s `Drop` (`VOMS_Destroy`) on every exit path:
//! success, rejection, internal error, panic. Sessions are never shared or
//! reused across requests.
#![allow(unsafe_code)]

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use foreign_types::ForeignType;
use libloading::{Library, Symbol};
use openssl::stack::Stack;
use openssl::x509::X509;
use tracing::{debug, warn};

use super::chain::CertificateChain;
use super::validator::{
    AttributeCertificateInfo, AttributeValidator, ValidationFailure, ValidatorOptions,
};
use crate::Error;

/// `VERIFY_NONE` flag for `VOMS_SetVerificationType`.
const VERIFY_NONE: c_int = 0x040;

/// Hard bound on the fqan array walk. The array is null-terminated; a
/// well-formed AC never comes close to this.
const MAX_FQANS: usize = 1024;

/// Diagnostic code used when the failure is in this binding rather than
/// in the native routine (missing symbol, null session, bad PEM reload).
const CODE_BINDING: i32 = -1;

// Layout mirrors struct voms in voms.h; most fields exist only to keep
// the offsets right.
#[allow(dead_code)]
#[repr(C)]
struct RawVoms {
    siglen: i32,
    signature: *mut c_char,
    user: *mut c_char,
    userca: *mut c_char,
    server: *mut c_char,
    serverca: *mut c_char,
    voname: *mut c_char,
    uri: *mut c_char,
    date1: *mut c_char,
    date2: *mut c_char,
    ac_type: i32,
    std: *mut c_void,
    custom: *mut c_char,
    datalen: i32,
    version: i32,
    fqan: *mut *mut c_char,
    serial: *mut c_char,
    ac: *mut c_void,
    holder: *mut c_void,
}

#[allow(dead_code)]
#[repr(C)]
struct RawVomsData {
    cdir: *mut c_char,
    vdir: *mut c_char,
    data: *mut *mut RawVoms,
    workvo: *mut c_char,
    extra_data: *mut c_char,
    volen: i32,
    extralen: i32,
    real: *mut c_void,
}

type VomsInitFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut RawVomsData;
type VomsSetVerificationTypeFn =
    unsafe extern "C" fn(c_int, *mut RawVomsData, *mut c_int) -> c_int;
type VomsRetrieveFn =
    unsafe extern "C" fn(*mut c_void, *mut c_void, c_int, *mut RawVomsData, *mut c_int) -> c_int;
type VomsDestroyFn = unsafe extern "C" fn(*mut RawVomsData);

/// One `VOMS_Init`..`VOMS_Destroy` session, scoped to a single validate
/// call. Dropping releases the native handle unconditionally.
struct Session<'lib> {
    destroy: Symbol<'lib, VomsDestroyFn>,
    vd: *mut RawVomsData,
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.vd) };
    }
}

/// Validation boundary backed by a dlopen'd `libvomsapi`.
pub struct LibVomsValidator {
    library: Library,
    vomsdir: CString,
    cadir: CString,
    skip_verify: bool,
}

impl LibVomsValidator {
    /// Load the VOMS C API and fix the validator options for the process
    /// lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the shared library cannot be loaded or
    /// a directory path cannot be passed over the C boundary.
    pub fn open(lib_name: &str, options: &ValidatorOptions) -> crate::Result<Self> {
        let library = unsafe { Library::new(lib_name) }.map_err(|e| {
            Error::Config(format!("could not load VOMS API library {lib_name}: {e}"))
        })?;
        let vomsdir = path_cstring(&options.vomsdir_path)?;
        let cadir = path_cstring(&options.ca_path)?;
        if options.skip_verify {
            warn!("AC signature verification DISABLED - local testing only");
        }
        Ok(Self {
            library,
            vomsdir,
            cadir,
            skip_verify: options.skip_verify,
        })
    }

    fn symbol<T>(&self, name: &[u8]) -> Result<Symbol<'_, T>, ValidationFailure> {
        unsafe { self.library.get(name) }.map_err(|e| {
            warn!(error = %e, "VOMS API symbol lookup failed");
            ValidationFailure::new(CODE_BINDING)
        })
    }
}

impl AttributeValidator for LibVomsValidator {
    fn validate(
        &self,
        chain: &CertificateChain,
    ) -> Result<AttributeCertificateInfo, ValidationFailure> {
        let init: Symbol<'_, VomsInitFn> = self.symbol(b"VOMS_Init\0")?;
        let retrieve: Symbol<'_, VomsRetrieveFn> = self.symbol(b"VOMS_Retrieve\0")?;
        let destroy: Symbol<'_, VomsDestroyFn> = self.symbol(b"VOMS_Destroy\0")?;

        // Reload the already-vetted PEM into OpenSSL objects the C API
        // understands. The objects stay alive for the whole native call.
        let cert = X509::from_pem(chain.cert_pem.as_bytes()).map_err(|e| {
            warn!(error = %e, "OpenSSL rejected the client certificate PEM");
            ValidationFailure::new(CODE_BINDING)
        })?;
        let mut stack: Stack<X509> =
            Stack::new().map_err(|_| ValidationFailure::new(CODE_BINDING))?;
        for pem in &chain.chain_pem {
            let issuer = X509::from_pem(pem.as_bytes()).map_err(|e| {
                warn!(error = %e, "OpenSSL rejected a chain certificate PEM");
                ValidationFailure::new(CODE_BINDING)
            })?;
            stack
                .push(issuer)
                .map_err(|_| ValidationFailure::new(CODE_BINDING))?;
        }

        let vd = unsafe { init(self.vomsdir.as_ptr(), self.cadir.as_ptr()) };
        if vd.is_null() {
            warn!("VOMS_Init returned no session");
            return Err(ValidationFailure::new(CODE_BINDING));
        }
        // From here on the session is released by Drop, whatever happens.
        let session = Session { destroy, vd };

        let mut error: c_int = 0;
        if self.skip_verify {
            let set_verification: Symbol<'_, VomsSetVerificationTypeFn> =
                self.symbol(b"VOMS_SetVerificationType\0")?;
            unsafe { set_verification(VERIFY_NONE, session.vd, &mut error) };
        }

        let res = unsafe {
            retrieve(
                cert.as_ptr().cast::<c_void>(),
                stack.as_ptr().cast::<c_void>(),
                0,
                session.vd,
                &mut error,
            )
        };
        if res == 0 {
            // No attribute data or failed signature/CA check; the code is
            // logged by the caller, never echoed to the client.
            return Err(ValidationFailure::new(error));
        }

        let info = unsafe { decode_payload(session.vd) }?;
        debug!(vo = %info.vo_name, user = %info.user, "AC decoded");
        Ok(info)
    }
}

/// Decode the first AC payload out of a retrieved session.
///
/// # Safety
///
/// `vd` must be a live pointer returned by `VOMS_Init` on which
/// `VOMS_Retrieve` just succeeded.
unsafe fn decode_payload(
    vd: *mut RawVomsData,
) -> Result<AttributeCertificateInfo, ValidationFailure> {
    let data = unsafe { (*vd).data };
    if data.is_null() {
        return Err(ValidationFailure::new(CODE_BINDING));
    }
    let first = unsafe { *data };
    if first.is_null() {
        return Err(ValidationFailure::new(CODE_BINDING));
    }
    let voms = unsafe { &*first };

    let not_before = unsafe { cstring_field(voms.date1) };
    let not_after = unsafe { cstring_field(voms.date2) };
    let (Some(not_before), Some(not_after)) = (
        parse_generalized_time(&not_before),
        parse_generalized_time(&not_after),
    ) else {
        warn!("AC validity timestamps did not parse");
        return Err(ValidationFailure::new(CODE_BINDING));
    };

    let mut fqans = Vec::new();
    if !voms.fqan.is_null() {
        for i in 0..MAX_FQANS {
            let entry = unsafe { *voms.fqan.add(i) };
            if entry.is_null() {
                break;
            }
            fqans.push(unsafe { cstring_field(entry) });
        }
    }

    Ok(AttributeCertificateInfo {
        user: unsafe { cstring_field(voms.user) },
        user_ca: unsafe { cstring_field(voms.userca) },
        server: unsafe { cstring_field(voms.server) },
        server_ca: unsafe { cstring_field(voms.serverca) },
        vo_name: unsafe { cstring_field(voms.voname) },
        uri: unsafe { cstring_field(voms.uri) },
        version: voms.version,
        serial: unsafe { cstring_field(voms.serial) },
        not_before,
        not_after,
        fqans,
    })
}

/// Copy a possibly-null C string field.
///
/// # Safety
///
/// `ptr` must be null or point to a valid NUL-terminated string.
unsafe fn cstring_field(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

/// Parse an ASN.1 GeneralizedTime-style stamp (`YYYYMMDDHHMMSSZ`).
fn parse_generalized_time(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

fn path_cstring(path: &Path) -> crate::Result<CString> {
    CString::new(path.to_string_lossy().into_owned())
        .map_err(|_| Error::Config(format!("path contains NUL byte: {}", path.display())))
}
