//! Errno-style syscall shim exposed into engine contexts.
//!
//! Scripts get a `binding` object with a thin layer over the host OS: file
//! descriptor primitives, directory operations and a handful of process
//! calls. Failing calls do not throw; they return an error object carrying
//! `errcode`, `errsym`, `errstr` and `syscall`, so scripts branch on errno
//! the way C callers would. The object also exports errno/open/seek
//! constants, the process environment, `pid`, `platform`, `arch` and the
//! engine version string.

use std::ffi::CString;
use std::rc::Rc;

/// Ceiling on script-requested buffer sizes; absurd lengths come back as
/// `EINVAL` instead of exhausting the allocator.
const IO_SIZE_LIMIT: i64 = 64 << 20;

use crate::bridge::context::target_context;
use crate::bridge::dispatch::JsRef;
use crate::bridge::error::{BridgeError, Result};
use crate::bridge::BridgeInner;

/// Installs the `binding` object onto the target context's global.
pub(crate) fn install(bridge: &Rc<BridgeInner>, target: Option<&JsRef>) -> Result<()> {
    bridge.enter(|scope| {
        let context = target_context(bridge, scope, target)?;
        let scope = &mut v8::ContextScope::new(scope, context);
        let binding = build_binding(scope)?;
        let global = context.global(scope);
        let key = v8::String::new(scope, "binding").ok_or(BridgeError::Alloc)?;
        global.set(scope, key.into(), binding.into());
        Ok(())
    })
}

fn build_binding<'s>(scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Object>> {
    let binding = v8::Object::new(scope);

    set_function(scope, binding, "open", shim_open)?;
    set_function(scope, binding, "close", shim_close)?;
    set_function(scope, binding, "read", shim_read)?;
    set_function(scope, binding, "write", shim_write)?;
    set_function(scope, binding, "pread", shim_pread)?;
    set_function(scope, binding, "pwrite", shim_pwrite)?;
    set_function(scope, binding, "lseek", shim_lseek)?;
    set_function(scope, binding, "fsync", shim_fsync)?;
    set_function(scope, binding, "truncate", shim_truncate)?;
    set_function(scope, binding, "ftruncate", shim_ftruncate)?;
    set_function(scope, binding, "unlink", shim_unlink)?;
    set_function(scope, binding, "rename", shim_rename)?;
    set_function(scope, binding, "mkdir", shim_mkdir)?;
    set_function(scope, binding, "rmdir", shim_rmdir)?;
    set_function(scope, binding, "chdir", shim_chdir)?;
    set_function(scope, binding, "getcwd", shim_getcwd)?;
    set_function(scope, binding, "stat", shim_stat)?;
    set_function(scope, binding, "lstat", shim_lstat)?;
    set_function(scope, binding, "fstat", shim_fstat)?;
    set_function(scope, binding, "readlink", shim_readlink)?;
    set_function(scope, binding, "symlink", shim_symlink)?;
    set_function(scope, binding, "link", shim_link)?;
    set_function(scope, binding, "chmod", shim_chmod)?;
    set_function(scope, binding, "fchmod", shim_fchmod)?;
    set_function(scope, binding, "chown", shim_chown)?;
    set_function(scope, binding, "lchown", shim_lchown)?;
    set_function(scope, binding, "readdir", shim_readdir)?;
    set_function(scope, binding, "realpath", shim_realpath)?;
    set_function(scope, binding, "kill", shim_kill)?;
    set_function(scope, binding, "getuid", shim_getuid)?;
    set_function(scope, binding, "getgid", shim_getgid)?;
    set_function(scope, binding, "umask", shim_umask)?;

    let consts = build_consts(scope)?;
    set_value(scope, binding, "consts", consts.into())?;
    let env = build_env(scope)?;
    set_value(scope, binding, "env", env.into())?;

    let pid = v8::Integer::new(scope, std::process::id() as i32);
    set_value(scope, binding, "pid", pid.into())?;
    let platform = v8::String::new(scope, std::env::consts::OS).ok_or(BridgeError::Alloc)?;
    set_value(scope, binding, "platform", platform.into())?;
    let arch = v8::String::new(scope, std::env::consts::ARCH).ok_or(BridgeError::Alloc)?;
    set_value(scope, binding, "arch", arch.into())?;
    let version = v8::String::new(scope, v8::V8::get_version()).ok_or(BridgeError::Alloc)?;
    set_value(scope, binding, "version", version.into())?;

    Ok(binding)
}

fn set_function(
    scope: &mut v8::HandleScope,
    object: v8::Local<v8::Object>,
    name: &str,
    callback: impl v8::MapFnTo<v8::FunctionCallback>,
) -> Result<()> {
    let function = v8::Function::new(scope, callback).ok_or(BridgeError::Alloc)?;
    set_value(scope, object, name, function.into())
}

fn set_value(
    scope: &mut v8::HandleScope,
    object: v8::Local<v8::Object>,
    name: &str,
    value: v8::Local<v8::Value>,
) -> Result<()> {
    let key = v8::String::new(scope, name).ok_or(BridgeError::Alloc)?;
    object.set(scope, key.into(), value);
    Ok(())
}

fn build_consts<'s>(scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Object>> {
    let consts = v8::Object::new(scope);
    let entries: &[(&str, i32)] = &[
        ("O_RDONLY", libc::O_RDONLY),
        ("O_WRONLY", libc::O_WRONLY),
        ("O_RDWR", libc::O_RDWR),
        ("O_CREAT", libc::O_CREAT),
        ("O_TRUNC", libc::O_TRUNC),
        ("O_APPEND", libc::O_APPEND),
        ("O_EXCL", libc::O_EXCL),
        ("SEEK_SET", libc::SEEK_SET),
        ("SEEK_CUR", libc::SEEK_CUR),
        ("SEEK_END", libc::SEEK_END),
        ("S_IFMT", libc::S_IFMT as i32),
        ("S_IFREG", libc::S_IFREG as i32),
        ("S_IFDIR", libc::S_IFDIR as i32),
        ("S_IFLNK", libc::S_IFLNK as i32),
        ("EPERM", libc::EPERM),
        ("ENOENT", libc::ENOENT),
        ("EINTR", libc::EINTR),
        ("EIO", libc::EIO),
        ("EBADF", libc::EBADF),
        ("EACCES", libc::EACCES),
        ("EEXIST", libc::EEXIST),
        ("ENOTDIR", libc::ENOTDIR),
        ("EISDIR", libc::EISDIR),
        ("EINVAL", libc::EINVAL),
        ("ENOSPC", libc::ENOSPC),
        ("EROFS", libc::EROFS),
        ("ENOTEMPTY", libc::ENOTEMPTY),
    ];
    for (name, value) in entries {
        let value = v8::Integer::new(scope, *value);
        set_value(scope, consts, name, value.into())?;
    }
    Ok(consts)
}

fn build_env<'s>(scope: &mut v8::HandleScope<'s>) -> Result<v8::Local<'s, v8::Object>> {
    let env = v8::Object::new(scope);
    for (name, value) in std::env::vars() {
        let value = v8::String::new(scope, &value).ok_or(BridgeError::Alloc)?;
        set_value(scope, env, &name, value.into())?;
    }
    Ok(env)
}

fn errsym(errno: i32) -> &'static str {
    match errno {
        libc::EPERM => "EPERM",
        libc::ENOENT => "ENOENT",
        libc::EINTR => "EINTR",
        libc::EIO => "EIO",
        libc::EBADF => "EBADF",
        libc::EACCES => "EACCES",
        libc::EEXIST => "EEXIST",
        libc::ENOTDIR => "ENOTDIR",
        libc::EISDIR => "EISDIR",
        libc::EINVAL => "EINVAL",
        libc::ENOSPC => "ENOSPC",
        libc::EROFS => "EROFS",
        libc::ENOTEMPTY => "ENOTEMPTY",
        libc::ENAMETOOLONG => "ENAMETOOLONG",
        libc::ELOOP => "ELOOP",
        libc::ESRCH => "ESRCH",
        _ => "EUNKNOWN",
    }
}

/// Builds the error object a failing shim call returns.
fn errno_result(scope: &mut v8::HandleScope, syscall: &str, errno: i32) -> v8::Local<v8::Value> {
    let error = v8::Object::new(scope);
    let errcode = v8::Integer::new(scope, errno);
    let _ = set_value(scope, error, "errcode", errcode.into());
    if let Some(sym) = v8::String::new(scope, errsym(errno)) {
        let _ = set_value(scope, error, "errsym", sym.into());
    }
    let text = std::io::Error::from_raw_os_error(errno).to_string();
    if let Some(errstr) = v8::String::new(scope, &text) {
        let _ = set_value(scope, error, "errstr", errstr.into());
    }
    if let Some(name) = v8::String::new(scope, syscall) {
        let _ = set_value(scope, error, "syscall", name.into());
    }
    error.into()
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

fn string_arg(
    scope: &mut v8::HandleScope,
    args: &v8::FunctionCallbackArguments,
    index: i32,
) -> Option<String> {
    let value = args.get(index);
    if value.is_string() {
        Some(value.to_rust_string_lossy(scope))
    } else {
        None
    }
}

fn int_arg(
    scope: &mut v8::HandleScope,
    args: &v8::FunctionCallbackArguments,
    index: i32,
) -> Option<i64> {
    let value = args.get(index);
    if value.is_number() {
        value.integer_value(scope)
    } else {
        None
    }
}

fn path_arg(
    scope: &mut v8::HandleScope,
    args: &v8::FunctionCallbackArguments,
    index: i32,
) -> Option<CString> {
    string_arg(scope, args, index).and_then(|path| CString::new(path).ok())
}

fn bad_args(scope: &mut v8::HandleScope, syscall: &str, mut rv: v8::ReturnValue) {
    let result = errno_result(scope, syscall, libc::EINVAL);
    rv.set(result);
}

fn shim_open(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(path) = path_arg(scope, &args, 0) else {
        return bad_args(scope, "open", rv);
    };
    let flags = int_arg(scope, &args, 1).unwrap_or(libc::O_RDONLY as i64) as i32;
    let mode = int_arg(scope, &args, 2).unwrap_or(0o666) as libc::c_uint;
    let fd = unsafe { libc::open(path.as_ptr(), flags, mode) };
    if fd < 0 {
        rv.set(errno_result(scope, "open", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, fd).into());
    }
}

fn shim_close(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(fd) = int_arg(scope, &args, 0) else {
        return bad_args(scope, "close", rv);
    };
    let ret = unsafe { libc::close(fd as i32) };
    if ret < 0 {
        rv.set(errno_result(scope, "close", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_read(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(fd), Some(len)) = (int_arg(scope, &args, 0), int_arg(scope, &args, 1)) else {
        return bad_args(scope, "read", rv);
    };
    if !(0..=IO_SIZE_LIMIT).contains(&len) {
        return bad_args(scope, "read", rv);
    }
    let mut buffer = vec![0u8; len as usize];
    let count =
        unsafe { libc::read(fd as i32, buffer.as_mut_ptr() as *mut libc::c_void, buffer.len()) };
    if count < 0 {
        rv.set(errno_result(scope, "read", last_errno()));
        return;
    }
    buffer.truncate(count as usize);
    let store = v8::ArrayBuffer::new_backing_store_from_vec(buffer).make_shared();
    let array = v8::ArrayBuffer::with_backing_store(scope, &store);
    rv.set(array.into());
}

fn shim_pread(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(fd), Some(len), Some(offset)) = (
        int_arg(scope, &args, 0),
        int_arg(scope, &args, 1),
        int_arg(scope, &args, 2),
    ) else {
        return bad_args(scope, "pread", rv);
    };
    if !(0..=IO_SIZE_LIMIT).contains(&len) {
        return bad_args(scope, "pread", rv);
    }
    let mut buffer = vec![0u8; len as usize];
    let count = unsafe {
        libc::pread(
            fd as i32,
            buffer.as_mut_ptr() as *mut libc::c_void,
            buffer.len(),
            offset as libc::off_t,
        )
    };
    if count < 0 {
        rv.set(errno_result(scope, "pread", last_errno()));
        return;
    }
    buffer.truncate(count as usize);
    let store = v8::ArrayBuffer::new_backing_store_from_vec(buffer).make_shared();
    let array = v8::ArrayBuffer::with_backing_store(scope, &store);
    rv.set(array.into());
}

fn shim_write(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(fd) = int_arg(scope, &args, 0) else {
        return bad_args(scope, "write", rv);
    };
    let Some(bytes) = payload_bytes(scope, &args, 1) else {
        return bad_args(scope, "write", rv);
    };
    let count =
        unsafe { libc::write(fd as i32, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
    if count < 0 {
        rv.set(errno_result(scope, "write", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, count as i32).into());
    }
}

fn shim_pwrite(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(fd) = int_arg(scope, &args, 0) else {
        return bad_args(scope, "pwrite", rv);
    };
    let Some(bytes) = payload_bytes(scope, &args, 1) else {
        return bad_args(scope, "pwrite", rv);
    };
    let Some(offset) = int_arg(scope, &args, 2) else {
        return bad_args(scope, "pwrite", rv);
    };
    let count = unsafe {
        libc::pwrite(
            fd as i32,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
            offset as libc::off_t,
        )
    };
    if count < 0 {
        rv.set(errno_result(scope, "pwrite", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, count as i32).into());
    }
}

/// Extracts a write payload: a string (as UTF-8) or an array buffer.
fn payload_bytes(
    scope: &mut v8::HandleScope,
    args: &v8::FunctionCallbackArguments,
    index: i32,
) -> Option<Vec<u8>> {
    let payload = args.get(index);
    if payload.is_string() {
        return Some(payload.to_rust_string_lossy(scope).into_bytes());
    }
    if let Ok(buffer) = v8::Local::<v8::ArrayBuffer>::try_from(payload) {
        let store = buffer.get_backing_store();
        return Some(match store.data() {
            Some(data) => unsafe {
                std::slice::from_raw_parts(data.as_ptr() as *const u8, store.byte_length())
            }
            .to_vec(),
            None => Vec::new(),
        });
    }
    None
}

fn shim_lseek(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(fd), Some(offset)) = (int_arg(scope, &args, 0), int_arg(scope, &args, 1)) else {
        return bad_args(scope, "lseek", rv);
    };
    let whence = int_arg(scope, &args, 2).unwrap_or(libc::SEEK_SET as i64) as i32;
    let ret = unsafe { libc::lseek(fd as i32, offset as libc::off_t, whence) };
    if ret < 0 {
        rv.set(errno_result(scope, "lseek", last_errno()));
    } else {
        rv.set(v8::Number::new(scope, ret as f64).into());
    }
}

fn shim_fsync(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(fd) = int_arg(scope, &args, 0) else {
        return bad_args(scope, "fsync", rv);
    };
    let ret = unsafe { libc::fsync(fd as i32) };
    if ret < 0 {
        rv.set(errno_result(scope, "fsync", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn path_call(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
    syscall: &str,
    call: impl FnOnce(&CString) -> i32,
) {
    let Some(path) = path_arg(scope, &args, 0) else {
        return bad_args(scope, syscall, rv);
    };
    let ret = call(&path);
    if ret < 0 {
        rv.set(errno_result(scope, syscall, last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_unlink(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    rv: v8::ReturnValue,
) {
    path_call(scope, args, rv, "unlink", |path| unsafe {
        libc::unlink(path.as_ptr())
    });
}

fn shim_rename(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(from), Some(to)) = (path_arg(scope, &args, 0), path_arg(scope, &args, 1)) else {
        return bad_args(scope, "rename", rv);
    };
    let ret = unsafe { libc::rename(from.as_ptr(), to.as_ptr()) };
    if ret < 0 {
        rv.set(errno_result(scope, "rename", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_mkdir(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(path) = path_arg(scope, &args, 0) else {
        return bad_args(scope, "mkdir", rv);
    };
    let mode = int_arg(scope, &args, 1).unwrap_or(0o777) as libc::mode_t;
    let ret = unsafe { libc::mkdir(path.as_ptr(), mode) };
    if ret < 0 {
        rv.set(errno_result(scope, "mkdir", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_rmdir(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    rv: v8::ReturnValue,
) {
    path_call(scope, args, rv, "rmdir", |path| unsafe {
        libc::rmdir(path.as_ptr())
    });
}

fn shim_chdir(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    rv: v8::ReturnValue,
) {
    path_call(scope, args, rv, "chdir", |path| unsafe {
        libc::chdir(path.as_ptr())
    });
}

fn shim_getcwd(
    scope: &mut v8::HandleScope,
    _args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    match std::env::current_dir() {
        Ok(dir) => {
            let text = dir.to_string_lossy();
            match v8::String::new(scope, &text) {
                Some(string) => rv.set(string.into()),
                None => rv.set(errno_result(scope, "getcwd", libc::EINVAL)),
            }
        }
        Err(err) => {
            let errno = err.raw_os_error().unwrap_or(libc::EIO);
            rv.set(errno_result(scope, "getcwd", errno));
        }
    }
}

fn shim_stat(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(path) = path_arg(scope, &args, 0) else {
        return bad_args(scope, "stat", rv);
    };
    let mut buf: libc::stat = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::stat(path.as_ptr(), &mut buf) };
    if ret < 0 {
        rv.set(errno_result(scope, "stat", last_errno()));
        return;
    }
    rv.set(stat_object(scope, &buf).into());
}

fn shim_lstat(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(path) = path_arg(scope, &args, 0) else {
        return bad_args(scope, "lstat", rv);
    };
    let mut buf: libc::stat = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::lstat(path.as_ptr(), &mut buf) };
    if ret < 0 {
        rv.set(errno_result(scope, "lstat", last_errno()));
        return;
    }
    rv.set(stat_object(scope, &buf).into());
}

fn shim_fstat(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(fd) = int_arg(scope, &args, 0) else {
        return bad_args(scope, "fstat", rv);
    };
    let mut buf: libc::stat = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::fstat(fd as i32, &mut buf) };
    if ret < 0 {
        rv.set(errno_result(scope, "fstat", last_errno()));
        return;
    }
    rv.set(stat_object(scope, &buf).into());
}

fn stat_object<'s>(
    scope: &mut v8::HandleScope<'s>,
    buf: &libc::stat,
) -> v8::Local<'s, v8::Object> {
    let result = v8::Object::new(scope);
    let fields: &[(&str, f64)] = &[
        ("dev", buf.st_dev as f64),
        ("ino", buf.st_ino as f64),
        ("mode", buf.st_mode as f64),
        ("nlink", buf.st_nlink as f64),
        ("uid", buf.st_uid as f64),
        ("gid", buf.st_gid as f64),
        ("size", buf.st_size as f64),
        ("atime", buf.st_atime as f64),
        ("mtime", buf.st_mtime as f64),
        ("ctime", buf.st_ctime as f64),
    ];
    for (name, value) in fields {
        let number = v8::Number::new(scope, *value);
        let _ = set_value(scope, result, name, number.into());
    }
    result
}

fn shim_readlink(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(path) = path_arg(scope, &args, 0) else {
        return bad_args(scope, "readlink", rv);
    };
    let mut buffer = vec![0u8; libc::PATH_MAX as usize];
    let count = unsafe {
        libc::readlink(
            path.as_ptr(),
            buffer.as_mut_ptr() as *mut libc::c_char,
            buffer.len(),
        )
    };
    if count < 0 {
        rv.set(errno_result(scope, "readlink", last_errno()));
        return;
    }
    buffer.truncate(count as usize);
    let target = String::from_utf8_lossy(&buffer);
    match v8::String::new(scope, &target) {
        Some(string) => rv.set(string.into()),
        None => rv.set(errno_result(scope, "readlink", libc::EINVAL)),
    }
}

fn shim_symlink(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(target), Some(link)) = (path_arg(scope, &args, 0), path_arg(scope, &args, 1)) else {
        return bad_args(scope, "symlink", rv);
    };
    let ret = unsafe { libc::symlink(target.as_ptr(), link.as_ptr()) };
    if ret < 0 {
        rv.set(errno_result(scope, "symlink", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_link(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(existing), Some(new)) = (path_arg(scope, &args, 0), path_arg(scope, &args, 1))
    else {
        return bad_args(scope, "link", rv);
    };
    let ret = unsafe { libc::link(existing.as_ptr(), new.as_ptr()) };
    if ret < 0 {
        rv.set(errno_result(scope, "link", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_chmod(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(path), Some(mode)) = (path_arg(scope, &args, 0), int_arg(scope, &args, 1)) else {
        return bad_args(scope, "chmod", rv);
    };
    let ret = unsafe { libc::chmod(path.as_ptr(), mode as libc::mode_t) };
    if ret < 0 {
        rv.set(errno_result(scope, "chmod", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_fchmod(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(fd), Some(mode)) = (int_arg(scope, &args, 0), int_arg(scope, &args, 1)) else {
        return bad_args(scope, "fchmod", rv);
    };
    let ret = unsafe { libc::fchmod(fd as i32, mode as libc::mode_t) };
    if ret < 0 {
        rv.set(errno_result(scope, "fchmod", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_chown(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(path), Some(uid), Some(gid)) = (
        path_arg(scope, &args, 0),
        int_arg(scope, &args, 1),
        int_arg(scope, &args, 2),
    ) else {
        return bad_args(scope, "chown", rv);
    };
    let ret = unsafe { libc::chown(path.as_ptr(), uid as libc::uid_t, gid as libc::gid_t) };
    if ret < 0 {
        rv.set(errno_result(scope, "chown", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_lchown(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(path), Some(uid), Some(gid)) = (
        path_arg(scope, &args, 0),
        int_arg(scope, &args, 1),
        int_arg(scope, &args, 2),
    ) else {
        return bad_args(scope, "lchown", rv);
    };
    let ret = unsafe { libc::lchown(path.as_ptr(), uid as libc::uid_t, gid as libc::gid_t) };
    if ret < 0 {
        rv.set(errno_result(scope, "lchown", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_truncate(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(path), Some(length)) = (path_arg(scope, &args, 0), int_arg(scope, &args, 1))
    else {
        return bad_args(scope, "truncate", rv);
    };
    let ret = unsafe { libc::truncate(path.as_ptr(), length as libc::off_t) };
    if ret < 0 {
        rv.set(errno_result(scope, "truncate", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_ftruncate(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(fd), Some(length)) = (int_arg(scope, &args, 0), int_arg(scope, &args, 1)) else {
        return bad_args(scope, "ftruncate", rv);
    };
    let ret = unsafe { libc::ftruncate(fd as i32, length as libc::off_t) };
    if ret < 0 {
        rv.set(errno_result(scope, "ftruncate", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_readdir(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(path) = string_arg(scope, &args, 0) else {
        return bad_args(scope, "readdir", rv);
    };
    let entries = match std::fs::read_dir(&path) {
        Ok(entries) => entries,
        Err(err) => {
            let errno = err.raw_os_error().unwrap_or(libc::EIO);
            rv.set(errno_result(scope, "readdir", errno));
            return;
        }
    };
    let mut names: Vec<v8::Local<v8::Value>> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        if let Some(string) = v8::String::new(scope, &name.to_string_lossy()) {
            names.push(string.into());
        }
    }
    let array = v8::Array::new_with_elements(scope, &names);
    rv.set(array.into());
}

fn shim_realpath(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(path) = string_arg(scope, &args, 0) else {
        return bad_args(scope, "realpath", rv);
    };
    match std::fs::canonicalize(&path) {
        Ok(resolved) => {
            let text = resolved.to_string_lossy();
            match v8::String::new(scope, &text) {
                Some(string) => rv.set(string.into()),
                None => rv.set(errno_result(scope, "realpath", libc::EINVAL)),
            }
        }
        Err(err) => {
            let errno = err.raw_os_error().unwrap_or(libc::EIO);
            rv.set(errno_result(scope, "realpath", errno));
        }
    }
}

fn shim_kill(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let (Some(pid), Some(signal)) = (int_arg(scope, &args, 0), int_arg(scope, &args, 1)) else {
        return bad_args(scope, "kill", rv);
    };
    let ret = unsafe { libc::kill(pid as libc::pid_t, signal as i32) };
    if ret < 0 {
        rv.set(errno_result(scope, "kill", last_errno()));
    } else {
        rv.set(v8::Integer::new(scope, 0).into());
    }
}

fn shim_getuid(
    scope: &mut v8::HandleScope,
    _args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let uid = unsafe { libc::getuid() };
    rv.set(v8::Number::new(scope, uid as f64).into());
}

fn shim_getgid(
    scope: &mut v8::HandleScope,
    _args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let gid = unsafe { libc::getgid() };
    rv.set(v8::Number::new(scope, gid as f64).into());
}

fn shim_umask(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some(mask) = int_arg(scope, &args, 0) else {
        return bad_args(scope, "umask", rv);
    };
    let previous = unsafe { libc::umask(mask as libc::mode_t) };
    rv.set(v8::Number::new(scope, previous as f64).into());
}
