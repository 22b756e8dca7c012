//! Example demonstrating sqlweave's builders across dialects.
//!
//! Run with:
//!   cargo run --example sql_builder -p sqlweave
//!
//! No database needed: statements are rendered and printed.

use sqlweave::prelude::*;
use sqlweave::SelectQuery;

#[derive(Debug)]
struct Filters {
    status: Option<String>,
    search: Option<String>,
    roles_any_of: Vec<String>,
    include_deleted: bool,
    page: u64,
    per_page: u64,
}

fn list_users(qb: QueryBuilder, filters: &Filters) -> SelectQuery {
    let roles: Vec<Expr> = filters
        .roles_any_of
        .iter()
        .map(|role| eq("role", role.as_str()))
        .collect();

    let mut q = qb
        .select(["id", "name", "status", "role", "created_at"])
        .from("users")
        .and_where(or(roles));

    if let Some(status) = &filters.status {
        q = q.eq("status", status.as_str());
    }
    if let Some(search) = &filters.search {
        q = q.like("name", search);
    }
    if !filters.include_deleted {
        q = q.is_null("deleted_at");
    }

    q.order_by_desc("created_at")
        .paginate(filters.page, filters.per_page)
}

fn print(label: &str, q: &impl SqlQuery) -> SqlResult<()> {
    let built = q.build()?;
    println!("-- {label}");
    println!("{}", built.sql());
    println!("   params: {:?}\n", built.params());
    Ok(())
}

fn main() -> SqlResult<()> {
    let filters = Filters {
        status: Some("active".into()),
        search: Some("50%".into()),
        roles_any_of: vec!["admin".into(), "owner".into()],
        include_deleted: false,
        page: 2,
        per_page: 20,
    };

    for dialect in [Dialect::POSTGRES, Dialect::MYSQL, Dialect::SQLITE] {
        let qb = QueryBuilder::new(dialect);
        print(&format!("list users ({})", dialect.name), &list_users(qb, &filters))?;
        print(
            &format!("count ({})", dialect.name),
            &list_users(qb, &filters).count_query(),
        )?;
    }

    let qb = QueryBuilder::new(Dialect::POSTGRES);

    // Orders of active customers, using a CTE and EXISTS.
    let active = qb.select(["id"]).from("customers").eq("active", true);
    let orders = qb
        .select(["o.id", "o.total"])
        .from("orders o")
        .with("active_customers", active)
        .and_where(exists(
            qb.select(["1"])
                .from("active_customers a")
                .where_raw("a.id = o.customer_id", Vec::<Value>::new()),
        ))
        .between("o.total", 100, 500);
    print("orders of active customers", &orders)?;

    // Org chart via a recursive CTE.
    let anchor = qb
        .select(["id", "manager_id"])
        .from("employees")
        .is_null("manager_id");
    let step = qb
        .select(["e.id", "e.manager_id"])
        .from("employees e")
        .inner_join("chain c", raw("e.manager_id = c.id", Vec::<Value>::new()))?;
    let chain = qb
        .select_from("chain")
        .with_recursive("chain", anchor.union_all(step))?;
    print("org chart", &chain)?;

    // Upserts render per dialect.
    for dialect in [Dialect::POSTGRES, Dialect::MYSQL, Dialect::SQLITE] {
        let upsert = QueryBuilder::new(dialect)
            .upsert("counters", ["key"])
            .set("key", "visits")
            .set("n", 1)
            .do_update(["n"])?;
        print(&format!("upsert ({})", dialect.name), &upsert)?;
    }

    // Capability gaps are errors, not bad SQL.
    let mysql = QueryBuilder::new(Dialect::MYSQL);
    match mysql.select_from("a").intersect(mysql.select_from("b")) {
        Ok(_) => unreachable!("mysql has no INTERSECT"),
        Err(e) => println!("-- expected error: {e}"),
    }

    Ok(())
}
