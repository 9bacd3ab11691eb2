/*
 * This file is part of cpusig.
 *
 * Copyright (C) 2025 cpusig contributors
 *
 * cpusig is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * cpusig is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with cpusig. If not, see <https://www.gnu.org/licenses/>.
 */

//! Test utilities and fixtures
//!
//! Raw snapshots of real processors in the native text format.

use std::fs;
use std::path::{Path, PathBuf};

/// AMD Ryzen 7 1700X (family 17h, model 1)
pub const SUMMIT_RIDGE_SNAPSHOT: &str = "\
version=0.3.12
basic_cpuid[0]=0000000d 68747541 444d4163 69746e65
basic_cpuid[1]=00800f11 00100800 7ed8320b 178bfbff
basic_cpuid[7]=00000000 209c01a9 00000000 00000000
ext_cpuid[0]=8000001f 68747541 444d4163 69746e65
ext_cpuid[1]=00800f11 20000000 35c233ff 2fd3fbff
ext_cpuid[2]=20444d41 657a7952 2037206e 30303731
ext_cpuid[3]=69452058 2d746867 65726f43 6f725020
ext_cpuid[4]=73736563 0000726f 00000000 00000000
ext_cpuid[5]=ff40ff40 ff40ff40 20080140 40040140
ext_cpuid[6]=36006400 56006400 02006140 00208140
ext_cpuid[8]=00003030 00000007 0000610f 00000000
";

/// ARM Cortex-A76 with an AArch64 view of the ID registers
pub const CORTEX_A76_SNAPSHOT: &str = "\
version=0.3.12
arm_midr=00000000414fd0b1
arm_id_aa64isar[0]=0000000000011120
";

/// Write `text` as `name` inside `dir`
pub fn write_snapshot(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).expect("write snapshot fixture");
    path
}
