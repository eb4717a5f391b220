// Copyright (C) 2025 Paul Hampson
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License version 3 as  published by the
// Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

/// Stable numeric identity for an error, as reported over the command front end.
///
/// Driver errors live in `-1..=-8`, scale errors in `-1001..`, front end errors in `-2001..`.
pub trait ErrorCode {
    fn code(&self) -> i16;

    fn message(&self) -> &'static str;
}
