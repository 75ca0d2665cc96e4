//! Entity schemas and the repositories built from them.

pub mod account;
pub mod content;
pub mod hooks;
pub mod warehouse;

use crate::error::AppError;
use crate::repository::{Catalog, RepositoryRef};
use crate::schema::EntitySchema;
use crate::service::{DocumentRepository, HookPipeline};
use crate::store::StoreRef;
use hooks::{AddressText, InvoiceGuard, InvoiceStock, OwnerStamp, ProductChildren, ProductStock};

/// One shared repository per entity, created at startup.
#[derive(Clone)]
pub struct Repositories {
    pub catalog: Catalog,
    pub location: RepositoryRef,
    pub address: RepositoryRef,
    pub user: RepositoryRef,
    pub role: RepositoryRef,
    pub config: RepositoryRef,
    pub media: RepositoryRef,
    pub product_attribute: RepositoryRef,
    pub product_category: RepositoryRef,
    pub warehouse: RepositoryRef,
    pub product: RepositoryRef,
    pub inventory: RepositoryRef,
    pub invoice: RepositoryRef,
    pub todo: RepositoryRef,
    pub comment: RepositoryRef,
}

/// Owner stamping first, then the entity's own hooks in order.
fn build(schema: EntitySchema, store: &StoreRef, catalog: &Catalog, hooks: HookPipeline) -> Result<RepositoryRef, AppError> {
    let mut pipeline = HookPipeline::new();
    if schema.owner {
        pipeline = pipeline.with(OwnerStamp);
    }
    pipeline.extend(hooks);
    DocumentRepository::new(schema, store.clone(), catalog.clone())
        .with_hooks(pipeline)
        .register()
}

impl Repositories {
    pub fn build(store: StoreRef) -> Result<Self, AppError> {
        let catalog = Catalog::new();
        let plain = HookPipeline::new;
        Ok(Self {
            location: build(account::location(), &store, &catalog, plain())?,
            address: build(
                account::address(),
                &store,
                &catalog,
                HookPipeline::new().with(AddressText::new(catalog.clone())),
            )?,
            user: build(account::user(), &store, &catalog, plain())?,
            role: build(account::role(), &store, &catalog, plain())?,
            config: build(account::config(), &store, &catalog, plain())?,
            media: build(account::media(), &store, &catalog, plain())?,
            product_attribute: build(warehouse::product_attribute(), &store, &catalog, plain())?,
            product_category: build(warehouse::product_category(), &store, &catalog, plain())?,
            warehouse: build(warehouse::warehouse(), &store, &catalog, plain())?,
            product: build(
                warehouse::product(),
                &store,
                &catalog,
                HookPipeline::new().with(ProductChildren).with(ProductStock),
            )?,
            inventory: build(warehouse::inventory(), &store, &catalog, plain())?,
            invoice: build(
                warehouse::invoice(),
                &store,
                &catalog,
                HookPipeline::new()
                    .with(InvoiceGuard)
                    .with(InvoiceStock::new(catalog.clone())),
            )?,
            todo: build(content::todo(), &store, &catalog, plain())?,
            comment: build(content::comment(), &store, &catalog, plain())?,
            catalog,
        })
    }

    pub fn all(&self) -> [&RepositoryRef; 14] {
        [
            &self.location,
            &self.address,
            &self.user,
            &self.role,
            &self.config,
            &self.media,
            &self.product_attribute,
            &self.product_category,
            &self.warehouse,
            &self.product,
            &self.inventory,
            &self.invoice,
            &self.todo,
            &self.comment,
        ]
    }

    /// Creates backing collections (tables) where the store needs them.
    pub async fn ensure_collections(&self, store: &StoreRef) -> Result<(), AppError> {
        for repo in self.all() {
            store.ensure_collection(&repo.schema().name).await?;
        }
        Ok(())
    }
}
