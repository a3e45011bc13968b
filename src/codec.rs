// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Little and big endian byte cursors shared by the sketch serializers.

pub(crate) mod family;

use std::io;
use std::io::Cursor;

use byteorder::BigEndian;
use byteorder::LittleEndian;
use byteorder::ReadBytesExt;

/// Appends fixed-width values to a borrowed output buffer.
pub(crate) struct SketchBytes<'a> {
    bytes: &'a mut Vec<u8>,
}

impl<'a> SketchBytes<'a> {
    pub fn new(bytes: &'a mut Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn write_u8(&mut self, n: u8) {
        self.bytes.push(n);
    }

    pub fn write_u16_le(&mut self, n: u16) {
        self.bytes.extend_from_slice(&n.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, n: u32) {
        self.bytes.extend_from_slice(&n.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, n: u64) {
        self.bytes.extend_from_slice(&n.to_le_bytes());
    }

    pub fn write_f64_le(&mut self, n: f64) {
        self.bytes.extend_from_slice(&n.to_le_bytes());
    }
}

/// Reads fixed-width values from a byte slice, failing with
/// [`io::ErrorKind::UnexpectedEof`] once the slice is exhausted.
pub(crate) struct SketchSlice<'a> {
    slice: Cursor<&'a [u8]>,
}

impl<'a> SketchSlice<'a> {
    pub fn new(slice: &'a [u8]) -> Self {
        SketchSlice {
            slice: Cursor::new(slice),
        }
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.slice.read_u8()
    }

    pub fn read_u16_le(&mut self) -> io::Result<u16> {
        self.slice.read_u16::<LittleEndian>()
    }

    pub fn read_u16_be(&mut self) -> io::Result<u16> {
        self.slice.read_u16::<BigEndian>()
    }

    pub fn read_u32_le(&mut self) -> io::Result<u32> {
        self.slice.read_u32::<LittleEndian>()
    }

    pub fn read_u32_be(&mut self) -> io::Result<u32> {
        self.slice.read_u32::<BigEndian>()
    }

    pub fn read_u64_le(&mut self) -> io::Result<u64> {
        self.slice.read_u64::<LittleEndian>()
    }

    pub fn read_f32_be(&mut self) -> io::Result<f32> {
        self.slice.read_f32::<BigEndian>()
    }

    pub fn read_f64_le(&mut self) -> io::Result<f64> {
        self.slice.read_f64::<LittleEndian>()
    }

    pub fn read_f64_be(&mut self) -> io::Result<f64> {
        self.slice.read_f64::<BigEndian>()
    }
}
