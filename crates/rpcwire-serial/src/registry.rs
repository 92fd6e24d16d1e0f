//! Type parser registry.
//!
//! Resolution order for a requested type:
//! 1. parsers registered with [`Serializer::register`]
//! 2. built-in parsers for primitives, strings and byte strings
//! 3. factories, in the order they were added; the first to answer wins
//!
//! A resolved binding is cached and never replaced for the lifetime of the
//! registry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, PoisonError, RwLock};

use bytemuck::Pod;
use bytes::Bytes;
use tracing::debug;

use crate::collection::{CollectionParser, ElementCodec};
use crate::error::{Result, SerialError};
use crate::layout::ByteOrder;
use crate::parser::{BinaryParser, BytesParser, ScalarParser, Utf8Parser};
use crate::staging::{StagingConfig, StagingPolicy};
use crate::unmanaged::{
    bool_fns, char_fns, isize_fns, usize_fns, BlockCopyCodec, CollectionFactory, ConvertCodec,
};

/// Identity of a value type.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A parser with its value type erased.
#[derive(Clone)]
pub struct ErasedParser {
    key: TypeKey,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ErasedParser {
    pub fn new<T: 'static>(parser: Arc<dyn BinaryParser<T>>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            inner: Arc::new(parser),
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// The typed parser, if this parser handles `T`.
    pub fn typed<T: 'static>(&self) -> Option<Arc<dyn BinaryParser<T>>> {
        self.inner
            .downcast_ref::<Arc<dyn BinaryParser<T>>>()
            .cloned()
    }
}

impl std::fmt::Debug for ErasedParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedParser")
            .field("type", &self.key.name)
            .finish()
    }
}

/// A factory's answer for a type.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub parser: ErasedParser,
    /// Whether the registry may keep the parser for later lookups.
    pub cache: bool,
}

/// Fallback source of parsers for types without a direct registration.
pub trait ParserFactory: Send + Sync {
    /// A parser for `key`, or `None` to let the next factory try.
    fn create(&self, key: &TypeKey) -> Option<Resolution>;
}

/// Configuration for [`Serializer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializerConfig {
    /// Stream staging policy shared by every collection parser.
    pub staging: StagingConfig,
    /// Byte order the unmanaged codecs assume for the host.
    pub host_order: ByteOrder,
}

/// Registry of binary parsers, keyed by value type.
///
/// Safe to share across threads; lookups after the first resolution take
/// a read lock only.
pub struct Serializer {
    config: SerializerConfig,
    staging: StagingPolicy,
    builtin: HashMap<TypeId, ErasedParser>,
    user: RwLock<HashMap<TypeId, ErasedParser>>,
    factories: RwLock<Vec<Arc<dyn ParserFactory>>>,
    resolved: RwLock<HashMap<TypeId, ErasedParser>>,
}

impl Serializer {
    /// Create a registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default())
    }

    /// Create a registry with explicit configuration.
    pub fn with_config(config: SerializerConfig) -> Self {
        let staging = StagingPolicy::with_config(config.staging);
        let mut serializer = Self {
            config,
            staging,
            builtin: HashMap::new(),
            user: RwLock::new(HashMap::new()),
            factories: RwLock::new(Vec::new()),
            resolved: RwLock::new(HashMap::new()),
        };
        serializer.install_builtins();
        serializer
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    pub fn staging(&self) -> &StagingPolicy {
        &self.staging
    }

    fn install_builtins(&mut self) {
        self.install_pod::<u8>();
        self.install_pod::<u16>();
        self.install_pod::<u32>();
        self.install_pod::<u64>();
        self.install_pod::<u128>();
        self.install_pod::<i8>();
        self.install_pod::<i16>();
        self.install_pod::<i32>();
        self.install_pod::<i64>();
        self.install_pod::<i128>();
        self.install_pod::<f32>();
        self.install_pod::<f64>();

        let order = self.config.host_order;
        self.install_codec::<bool, _>(ConvertCodec::for_wire::<u8>(bool_fns(), order));
        self.install_codec::<char, _>(ConvertCodec::for_wire::<u32>(char_fns(), order));
        self.install_codec::<usize, _>(ConvertCodec::for_wire::<u64>(usize_fns(), order));
        self.install_codec::<isize, _>(ConvertCodec::for_wire::<i64>(isize_fns(), order));

        let utf8: Arc<dyn BinaryParser<String>> = Arc::new(Utf8Parser);
        self.insert_builtin(ErasedParser::new(utf8));
        let nullable: Arc<dyn BinaryParser<Option<String>>> = Arc::new(Utf8Parser);
        self.insert_builtin(ErasedParser::new(nullable));
        let raw: Arc<dyn BinaryParser<Bytes>> = Arc::new(BytesParser);
        self.insert_builtin(ErasedParser::new(raw));
    }

    fn install_pod<T: Pod>(&mut self) {
        self.install_codec::<T, _>(BlockCopyCodec::<T>::new(self.config.host_order));
    }

    fn install_codec<T, C>(&mut self, codec: C)
    where
        T: 'static,
        C: ElementCodec<T> + Clone + 'static,
    {
        let scalar: Arc<dyn BinaryParser<T>> = Arc::new(ScalarParser::new(codec.clone()));
        self.insert_builtin(ErasedParser::new(scalar));

        let collections = CollectionParser::with_staging(codec, self.staging.clone());
        self.factories
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(CollectionFactory::new(collections)));
    }

    fn insert_builtin(&mut self, parser: ErasedParser) {
        self.builtin.insert(parser.key().id(), parser);
    }

    /// Register a parser for `T`, taking priority over built-ins and
    /// factories.
    ///
    /// Fails with `AlreadyBound` if `T` already has a registered or
    /// resolved parser.
    pub fn register<T: 'static>(&self, parser: impl BinaryParser<T> + 'static) -> Result<()> {
        let key = TypeKey::of::<T>();
        let resolved = self.resolved.read().unwrap_or_else(PoisonError::into_inner);
        let mut user = self.user.write().unwrap_or_else(PoisonError::into_inner);
        if resolved.contains_key(&key.id) || user.contains_key(&key.id) {
            return Err(SerialError::AlreadyBound(key.name));
        }
        let parser: Arc<dyn BinaryParser<T>> = Arc::new(parser);
        user.insert(key.id, ErasedParser::new(parser));
        debug!(type_name = key.name, "registered binary parser");
        Ok(())
    }

    /// Register block-copy parsers for a `Pod` type and its collections.
    pub fn register_unmanaged<T: Pod>(&self) -> Result<()> {
        let codec = BlockCopyCodec::<T>::new(self.config.host_order);
        self.register::<T>(ScalarParser::new(codec.clone()))?;
        let collections = CollectionParser::with_staging(codec, self.staging.clone());
        self.add_factory(CollectionFactory::new(collections));
        Ok(())
    }

    /// Append a fallback factory. Earlier factories are asked first.
    pub fn add_factory(&self, factory: impl ParserFactory + 'static) {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(factory));
    }

    /// Resolve the parser for `T`.
    pub fn parser<T: 'static>(&self) -> Result<Arc<dyn BinaryParser<T>>> {
        let key = TypeKey::of::<T>();
        if let Some(parser) = self
            .resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.id)
        {
            return typed(parser, &key);
        }

        let direct = self
            .user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.id)
            .cloned()
            .or_else(|| self.builtin.get(&key.id).cloned());
        if let Some(parser) = direct {
            return typed(&self.bind(parser), &key);
        }

        let factories = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for factory in factories {
            let Some(resolution) = factory.create(&key) else {
                continue;
            };
            if resolution.parser.key() != key {
                debug!(
                    requested = key.name,
                    answered = resolution.parser.key().name,
                    "factory answered with a parser for another type"
                );
                continue;
            }
            let parser = if resolution.cache {
                self.bind(resolution.parser)
            } else {
                resolution.parser
            };
            return typed(&parser, &key);
        }

        Err(SerialError::UnsupportedType(key.name))
    }

    // First binding wins; a concurrent resolution gets the stored parser.
    // Lock order is `resolved` then `user`, as in `register`.
    fn bind(&self, parser: ErasedParser) -> ErasedParser {
        let id = parser.key().id();
        let mut resolved = self.resolved.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(bound) = resolved.get(&id) {
            return bound.clone();
        }
        // A registration that landed after the caller's lookup still wins.
        let parser = self
            .user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .unwrap_or(parser);
        resolved.insert(id, parser.clone());
        parser
    }

    /// Encoded size of `value`.
    pub fn encoded_size<T: 'static>(&self, value: &T) -> Result<usize> {
        Ok(self.parser::<T>()?.encoded_size(value))
    }

    pub fn write<T: 'static>(&self, value: &T, dst: &mut [u8]) -> Result<usize> {
        self.parser::<T>()?.write(value, dst)
    }

    pub fn write_to<T: 'static>(&self, value: &T, dst: &mut dyn Write) -> Result<usize> {
        self.parser::<T>()?.write_to(value, dst)
    }

    pub fn read<T: 'static>(&self, src: &[u8]) -> Result<(T, usize)> {
        self.parser::<T>()?.read(src)
    }

    pub fn read_from<T: 'static>(&self, src: &mut dyn Read) -> Result<(T, usize)> {
        self.parser::<T>()?.read_from(src)
    }

    /// Encode `value` into a new buffer of exactly its encoded size.
    pub fn to_bytes<T: 'static>(&self, value: &T) -> Result<Bytes> {
        let parser = self.parser::<T>()?;
        let mut buf = vec![0u8; parser.encoded_size(value)];
        let written = parser.write(value, &mut buf)?;
        buf.truncate(written);
        Ok(Bytes::from(buf))
    }

    /// Decode a value that must span all of `src`.
    pub fn from_bytes<T: 'static>(&self, src: &[u8]) -> Result<T> {
        let (value, consumed) = self.read::<T>(src)?;
        if consumed != src.len() {
            return Err(SerialError::InvalidValue {
                type_name: std::any::type_name::<T>(),
                reason: format!("{} trailing bytes after value", src.len() - consumed),
            });
        }
        Ok(value)
    }
}

fn typed<T: 'static>(parser: &ErasedParser, key: &TypeKey) -> Result<Arc<dyn BinaryParser<T>>> {
    parser
        .typed::<T>()
        .ok_or(SerialError::UnsupportedType(key.name))
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolved = self
            .resolved
            .read()
            .map(|map| map.len())
            .unwrap_or_default();
        f.debug_struct("Serializer")
            .field("config", &self.config)
            .field("builtin", &self.builtin.len())
            .field("resolved", &resolved)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    use super::*;
    use crate::collection::Segment;

    fn assert_size_matches_write<T: 'static>(serializer: &Serializer, value: &T) {
        let size = serializer.encoded_size(value).unwrap();
        let mut buf = vec![0u8; size + 8];
        let written = serializer.write(value, &mut buf).unwrap();
        assert_eq!(written, size, "size/write mismatch for {}", std::any::type_name::<T>());

        let mut stream = Vec::new();
        assert_eq!(serializer.write_to(value, &mut stream).unwrap(), size);
        assert_eq!(stream, &buf[..size]);
    }

    #[test]
    fn primitives_are_preregistered() {
        let serializer = Serializer::new();
        assert_size_matches_write(&serializer, &7u8);
        assert_size_matches_write(&serializer, &-7i128);
        assert_size_matches_write(&serializer, &1.5f64);
        assert_size_matches_write(&serializer, &true);
        assert_size_matches_write(&serializer, &'λ');
        assert_size_matches_write(&serializer, &usize::MAX);
        assert_size_matches_write(&serializer, &isize::MIN);
        assert_size_matches_write(&serializer, &"wire".to_string());
        assert_size_matches_write(&serializer, &None::<String>);
        assert_size_matches_write(&serializer, &Bytes::from_static(b"abc"));
    }

    #[test]
    fn primitive_collections_resolve_through_factories() {
        let serializer = Serializer::new();
        assert_size_matches_write(&serializer, &vec![1u32, 2, 3]);
        assert_size_matches_write(&serializer, &Some(vec![true, false]));
        assert_size_matches_write(&serializer, &None::<Box<[f32]>>);
        assert_size_matches_write(&serializer, &VecDeque::from(vec!['a', 'b']));
        assert_size_matches_write(&serializer, &Segment::new(vec![1i64, 2, 3], 1, 2).unwrap());

        let bytes = serializer.to_bytes(&vec![10u16, 20]).unwrap();
        let decoded: Vec<u16> = serializer.from_bytes(&bytes).unwrap();
        assert_eq!(decoded, vec![10, 20]);
    }

    #[test]
    fn unknown_type_is_unsupported() {
        struct Opaque;
        let serializer = Serializer::new();
        let err = serializer.parser::<Opaque>().err().unwrap();
        assert!(matches!(err, SerialError::UnsupportedType(name) if name.ends_with("Opaque")));
    }

    /// Writes every `u32` as four zero bytes.
    struct Zeroes;

    impl BinaryParser<u32> for Zeroes {
        fn is_variable_size(&self) -> bool {
            false
        }

        fn minimum_size(&self) -> usize {
            4
        }

        fn write(&self, _value: &u32, dst: &mut [u8]) -> Result<usize> {
            dst[..4].fill(0);
            Ok(4)
        }

        fn write_to(&self, _value: &u32, dst: &mut dyn Write) -> Result<usize> {
            dst.write_all(&[0; 4])?;
            Ok(4)
        }

        fn read(&self, _src: &[u8]) -> Result<(u32, usize)> {
            Ok((0, 4))
        }

        fn read_from(&self, src: &mut dyn Read) -> Result<(u32, usize)> {
            let mut buf = [0u8; 4];
            src.read_exact(&mut buf)?;
            Ok((0, 4))
        }
    }

    #[test]
    fn user_registration_overrides_builtin() {
        let serializer = Serializer::new();
        serializer.register::<u32>(Zeroes).unwrap();
        assert_eq!(serializer.to_bytes(&99u32).unwrap().as_ref(), &[0, 0, 0, 0]);
    }

    #[test]
    fn resolved_binding_is_never_replaced() {
        let serializer = Serializer::new();
        serializer.parser::<u32>().unwrap();
        let err = serializer.register::<u32>(Zeroes).unwrap_err();
        assert!(matches!(err, SerialError::AlreadyBound("u32")));
        assert_eq!(serializer.to_bytes(&1u32).unwrap().as_ref(), &[1, 0, 0, 0]);
    }

    #[test]
    fn registration_between_lookup_and_bind_wins() {
        let serializer = Serializer::new();
        let builtin = serializer.builtin[&TypeId::of::<u32>()].clone();
        serializer.register::<u32>(Zeroes).unwrap();

        serializer.bind(builtin);

        assert_eq!(serializer.to_bytes(&99u32).unwrap().as_ref(), &[0, 0, 0, 0]);
        let err = serializer.register::<u32>(Zeroes).unwrap_err();
        assert!(matches!(err, SerialError::AlreadyBound("u32")));
    }

    #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn registered_unmanaged_type_gets_collections() {
        let serializer = Serializer::new();
        serializer.register_unmanaged::<Point>().unwrap();

        let points = vec![Point { x: 1, y: -1 }, Point { x: 2, y: -2 }];
        let bytes = serializer.to_bytes(&points).unwrap();
        assert_eq!(bytes.len(), 2 + 16);

        let decoded: Vec<Point> = serializer.from_bytes(&bytes).unwrap();
        assert_eq!(decoded, points);

        let (single, consumed) = serializer
            .read_from::<Point>(&mut Cursor::new(bytes[2..10].to_vec()))
            .unwrap();
        assert_eq!((single, consumed), (points[0], 8));
    }

    struct CountingFactory {
        calls: AtomicUsize,
        cache: bool,
    }

    impl ParserFactory for CountingFactory {
        fn create(&self, key: &TypeKey) -> Option<Resolution> {
            if *key != TypeKey::of::<Point>() {
                return None;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            let parser: Arc<dyn BinaryParser<Point>> =
                Arc::new(ScalarParser::new(BlockCopyCodec::<Point>::with_host_order()));
            Some(Resolution {
                parser: ErasedParser::new(parser),
                cache: self.cache,
            })
        }
    }

    #[rstest::rstest]
    #[case::cached(true, 1)]
    #[case::uncached(false, 3)]
    fn factory_caching_is_its_choice(#[case] cache: bool, #[case] expected_calls: usize) {
        let serializer = Serializer::new();
        let factory = Arc::new(CountingFactory {
            calls: AtomicUsize::new(0),
            cache,
        });
        serializer.add_factory(SharedFactory(Arc::clone(&factory)));

        for _ in 0..3 {
            serializer.parser::<Point>().unwrap();
        }
        assert_eq!(factory.calls.load(Ordering::SeqCst), expected_calls);
    }

    struct SharedFactory(Arc<CountingFactory>);

    impl ParserFactory for SharedFactory {
        fn create(&self, key: &TypeKey) -> Option<Resolution> {
            self.0.create(key)
        }
    }

    #[test]
    fn from_bytes_rejects_trailing_data() {
        let serializer = Serializer::new();
        let err = serializer.from_bytes::<u16>(&[1, 0, 9]).unwrap_err();
        assert!(matches!(err, SerialError::InvalidValue { .. }));
    }

    proptest! {
        #[test]
        fn size_matches_write_for_strings(value in ".{0,300}") {
            let serializer = Serializer::new();
            let size = serializer.encoded_size(&value).unwrap();
            let bytes = serializer.to_bytes(&value).unwrap();
            prop_assert_eq!(bytes.len(), size);
            let decoded: String = serializer.from_bytes(&bytes).unwrap();
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn size_matches_write_for_collections(values in proptest::collection::vec(any::<u16>(), 0..400), null in any::<bool>()) {
            let serializer = Serializer::new();
            let value = if null { None } else { Some(values) };
            let size = serializer.encoded_size(&value).unwrap();
            let bytes = serializer.to_bytes(&value).unwrap();
            prop_assert_eq!(bytes.len(), size);
            let decoded: Option<Vec<u16>> = serializer.from_bytes(&bytes).unwrap();
            prop_assert_eq!(decoded, value);
        }
    }
}
