#![allow(non_snake_case)]

// Базовые модули
pub mod consts;
pub mod error;
pub mod config;
pub mod lock;

// Модель данных
pub mod value;
pub mod metatype;
pub mod component;

// Криптография (AES-GCM + пароли)
pub mod crypto; // src/crypto/{mod,password}.rs

// Снапшоты на диске
pub mod snapshots; // src/snapshots/{mod,xml,store}.rs

// Реестр, живое хранилище, слияние
pub mod registry;
pub mod store;
pub mod merge;
pub mod upgrade;

// Оркестратор и отложенное выполнение
pub mod executor;
pub mod service;

// Удобные реэкспорты
pub use component::{ComponentConfiguration, ComponentKind, SelfConfiguringComponent};
pub use config::{ServiceBuilder, ServiceConfig};
pub use error::ConfigError;
pub use metatype::{parse_metatype, AttributeDefinition, ObjectClassDefinition};
pub use registry::{ComponentRegistry, RegistryEvent};
pub use service::ConfigurationService;
pub use snapshots::SnapshotStore;
pub use store::{ConfigStore, MemoryConfigStore};
pub use upgrade::UpgradeRule;
pub use value::{Password, Properties, Scalar, ScalarValue, Value};

// Реэкспорты crypto API (для удобства использования из внешнего кода)
pub use crypto::{
    CryptoService, EnvKeyProvider, KeyMaterial, KeyProvider, KeySource, PasswordCodec,
    StaticKeyProvider,
};
