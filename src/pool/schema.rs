// Database schemas.

use crate::Error;
use crate::Result;
use rusqlite::Connection;

/// A description of a database schema.  A given schema has a specific
/// version.  It is also possible for there to be older versions that
/// are supported in a degraded mode.
pub struct Schema<'a, C: Clone + 'a> {
    /// A specific version string for the version described in `schema`
    /// below.
    pub version: &'a str,
    /// The SQL commands that will initialize the database to this
    /// schema.
    pub schema: &'a [&'a str],
    /// Possible compatible versions.
    pub compats: &'a [SchemaCompat<'a, C>],
}

/// Each compatible schema will have zero or more inabilities to that
/// database.  These are of type `C`.
pub struct SchemaCompat<'a, C: Clone + 'a> {
    /// The version of this compat.
    pub version: &'a str,
    /// The inabilities we have when this version is seen.
    pub inabilities: &'a [C],
}

impl<'a, C> Schema<'a, C>
    where C: 'a + Clone
{
    /// Given an empty database, create the given schema in it.
    pub fn set(&self, db: &mut Connection) -> Result<()> {
        let tx = db.transaction()?;
        for line in self.schema {
            tx.execute(line, [])?;
        }

        tx.execute("CREATE TABLE schema_version (version TEXT)", [])?;
        tx.execute("INSERT INTO schema_version VALUES (?)", [&self.version])?;

        tx.commit()?;
        Ok(())
    }

    /// Check if this schema matches, and report any inabilities of the
    /// version found.  An unrecognized version is an error.
    pub fn check(&self, db: &Connection) -> Result<Vec<C>> {
        let mut stmt = db.prepare("SELECT version FROM schema_version")?;
        let mut rows = stmt.query([])?;
        let version: String = match rows.next()? {
            None => return Err(Error::SchemaMismatch("no schema version".to_owned())),
            Some(row) => row.get(0)?,
        };

        // Make sure this is the last row.
        if rows.next()?.is_some() {
            return Err(Error::SchemaMismatch("multiple schema versions".to_owned()));
        }

        if version == self.version {
            return Ok(vec![]);
        }

        // Check any of the compats.
        for compat in self.compats {
            if version == compat.version {
                return Ok(compat.inabilities.to_vec());
            }
        }

        Err(Error::SchemaMismatch(version))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;
    use rusqlite::Connection;
    use tempfile::TempDir;

    #[derive(PartialOrd, Ord, PartialEq, Eq, Clone, Debug)]
    enum Modes {
        NoBar,
    }

    static SCHEMA1: Schema<'static, Modes> = Schema {
        version: "1",
        schema: &[r"CREATE TABLE foo(id INTEGER PRIMARY KEY)"],
        compats: &[],
    };

    static SCHEMA2: Schema<'static, Modes> = Schema {
        version: "2",
        schema: &[r"CREATE TABLE foo(id INTEGER PRIMARY KEY, bar TEXT)"],
        compats: &[SchemaCompat {
            version: "1",
            inabilities: &[Modes::NoBar],
        }],
    };

    #[test]
    fn test_set() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path();
        let mut conn = Connection::open(&path.join("blort.db")).unwrap();
        SCHEMA1.set(&mut conn).unwrap();
        assert!(SCHEMA1.check(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_compat() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path();
        let mut conn = Connection::open(&path.join("blort.db")).unwrap();
        SCHEMA1.set(&mut conn).unwrap();

        // The older version is usable, with a recorded inability.
        assert_eq!(SCHEMA2.check(&conn).unwrap(), vec![Modes::NoBar]);
    }

    #[test]
    fn test_mismatch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path();
        let mut conn = Connection::open(&path.join("blort.db")).unwrap();
        SCHEMA2.set(&mut conn).unwrap();

        match SCHEMA1.check(&conn) {
            Err(Error::SchemaMismatch(version)) => assert_eq!(version, "2"),
            other => panic!("Unknown version should not check: {:?}",
                            other.map(|v| v.len())),
        }
    }
}
