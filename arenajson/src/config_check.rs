// SPDX-License-Identifier: Apache-2.0

//! Compile-time configuration validation
//!
//! Exactly one number acceptance feature must be enabled.

#[cfg(not(any(feature = "strict-numbers", feature = "lenient-numbers")))]
compile_error!(
    "No number acceptance feature selected: choose one of 'strict-numbers' or 'lenient-numbers'"
);

#[cfg(all(feature = "strict-numbers", feature = "lenient-numbers"))]
compile_error!(
    "Cannot enable both 'strict-numbers' and 'lenient-numbers' features simultaneously: lenient builds need `default-features = false`"
);
