// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ordered event tags.
//!
//! Tags go over the wire as `[["key", "value"], ...]`. Older payloads (and
//! some proxies) send them as a plain object, so decoding accepts both shapes
//! and picks the branch from the first token of the input.

use std::fmt;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single key/value tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
	pub key: String,
	pub value: String,
}

impl Tag {
	pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			value: value.into(),
		}
	}
}

impl Serialize for Tag {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut pair = serializer.serialize_tuple(2)?;
		pair.serialize_element(&self.key)?;
		pair.serialize_element(&self.value)?;
		pair.end()
	}
}

impl<'de> Deserialize<'de> for Tag {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let [key, value] = <[String; 2]>::deserialize(deserializer)?;
		Ok(Self { key, value })
	}
}

/// Tags attached to an event, in insertion order. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(Vec<Tag>);

impl Tags {
	pub fn new() -> Self {
		Self(Vec::new())
	}

	/// Appends a tag, keeping any earlier tag with the same key.
	pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.0.push(Tag::new(key, value));
	}

	/// Appends every pair from `pairs` in iteration order.
	pub fn extend<I, K, V>(&mut self, pairs: I)
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.0.extend(pairs.into_iter().map(|(k, v)| Tag::new(k, v)));
	}

	/// Returns the most recently added value for `key`.
	pub fn get(&self, key: &str) -> Option<&str> {
		self
			.0
			.iter()
			.rev()
			.find(|tag| tag.key == key)
			.map(|tag| tag.value.as_str())
	}

	pub fn contains(&self, key: &str, value: &str) -> bool {
		self.0.iter().any(|tag| tag.key == key && tag.value == value)
	}

	pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
		self.0.iter()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut tags = Tags::new();
		tags.extend(iter);
		tags
	}
}

impl<'a> IntoIterator for &'a Tags {
	type Item = &'a Tag;
	type IntoIter = std::slice::Iter<'a, Tag>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

impl Serialize for Tags {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.0.serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for Tags {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_any(TagsVisitor)
	}
}

struct TagsVisitor;

impl<'de> Visitor<'de> for TagsVisitor {
	type Value = Tags;

	fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("an array of [key, value] pairs or an object of strings")
	}

	fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Tags, A::Error> {
		let mut tags = Vec::with_capacity(seq.size_hint().unwrap_or(0));
		while let Some(tag) = seq.next_element::<Tag>()? {
			tags.push(tag);
		}
		Ok(Tags(tags))
	}

	fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Tags, A::Error> {
		let mut tags = Vec::with_capacity(map.size_hint().unwrap_or(0));
		while let Some((key, value)) = map.next_entry::<String, String>()? {
			tags.push(Tag { key, value });
		}
		Ok(Tags(tags))
	}
}
