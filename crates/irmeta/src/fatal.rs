// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fail-fast reporting for kernel invariant violations.
//!
//! A broken invariant means collaborator registration code is wrong, not that
//! the input data is odd. There is no recovery path: the location is logged
//! and the thread panics.

/// Log the violation with its source location, then panic.
macro_rules! kernel_fatal {
    ($($arg:tt)+) => {{
        let message = format!($($arg)+);
        tracing::error!(
            file = file!(),
            line = line!(),
            module = module_path!(),
            "{}",
            message
        );
        panic!(
            "kernel invariant violated at {}:{} ({}): {}",
            file!(),
            line!(),
            module_path!(),
            message
        )
    }};
}

/// Check a kernel invariant.
macro_rules! kernel_assert {
    ($cond:expr) => {
        if !$cond {
            kernel_fatal!("assertion failed: {}", stringify!($cond));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            kernel_fatal!($($arg)+);
        }
    };
}
