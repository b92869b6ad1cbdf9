/*
 *  lib.rs
 *
 *  LySpot - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

//! Spotify now-playing on a 16x2 character LCD, driven by an IR remote,
//! over a serial link to a small microcontroller.

pub mod app;
pub mod config;
pub mod glyphs;
pub mod lcd;
pub mod remote;
pub mod serial;
pub mod spotify;
pub mod timeout;
pub mod updater;
